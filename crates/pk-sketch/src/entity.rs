//! Sketch Entities
//!
//! Points, normals and workplanes the engine parametrizes. Every entity
//! owns a fixed number of scalar params stored in the sketch.

use serde::{Deserialize, Serialize};

/// Partition of entities and constraints inside one sketch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Group(pub u32);

impl Group {
    /// Reference geometry that never moves during a solve
    pub const CONSTANT: Group = Group(1);
    /// Geometry whose params are unknowns of the solve
    pub const SOLVE: Group = Group(2);
}

/// Handle to a scalar parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamId(pub(crate) u32);

impl ParamId {
    /// Position of the param in the sketch's param table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub(crate) u32);

impl EntityId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// A scalar parameter and the group of the entity that owns it
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Param {
    pub group: Group,
    pub value: f64,
}

/// An entity of the sketch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SketchEntity {
    /// Free point in world space
    Point3d {
        id: EntityId,
        group: Group,
        /// x, y, z
        params: [ParamId; 3],
    },

    /// Orientation given as a quaternion
    Normal3d {
        id: EntityId,
        group: Group,
        /// w, x, y, z
        params: [ParamId; 4],
    },

    /// Plane placed by an origin point and a normal
    Workplane {
        id: EntityId,
        group: Group,
        origin: EntityId,
        normal: EntityId,
    },

    /// Point with plane-local coordinates on a workplane
    Point2d {
        id: EntityId,
        group: Group,
        workplane: EntityId,
        /// u, v
        params: [ParamId; 2],
    },
}

impl SketchEntity {
    pub fn id(&self) -> EntityId {
        match self {
            SketchEntity::Point3d { id, .. } => *id,
            SketchEntity::Normal3d { id, .. } => *id,
            SketchEntity::Workplane { id, .. } => *id,
            SketchEntity::Point2d { id, .. } => *id,
        }
    }

    pub fn group(&self) -> Group {
        match self {
            SketchEntity::Point3d { group, .. } => *group,
            SketchEntity::Normal3d { group, .. } => *group,
            SketchEntity::Workplane { group, .. } => *group,
            SketchEntity::Point2d { group, .. } => *group,
        }
    }

    /// Scalar params owned by this entity
    pub fn params(&self) -> &[ParamId] {
        match self {
            SketchEntity::Point3d { params, .. } => params,
            SketchEntity::Normal3d { params, .. } => params,
            SketchEntity::Workplane { .. } => &[],
            SketchEntity::Point2d { params, .. } => params,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SketchEntity::Point3d { .. } => "Point3d",
            SketchEntity::Normal3d { .. } => "Normal3d",
            SketchEntity::Workplane { .. } => "Workplane",
            SketchEntity::Point2d { .. } => "Point2d",
        }
    }

    /// Check if this entity has a world position
    pub fn is_point(&self) -> bool {
        matches!(
            self,
            SketchEntity::Point3d { .. } | SketchEntity::Point2d { .. }
        )
    }
}
