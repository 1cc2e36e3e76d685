//! Sketch Constraints
//!
//! Geometric and dimensional constraints between point entities. Each
//! constraint belongs to a group and is only considered when that group
//! is solved.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, Group};

/// Handle to a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintId(pub(crate) u32);

impl ConstraintId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// A constraint between sketch entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SketchConstraint {
    /// Two points share the same V coordinate in a workplane
    Horizontal {
        id: ConstraintId,
        group: Group,
        point1: EntityId,
        point2: EntityId,
        workplane: EntityId,
    },

    /// Two points share the same U coordinate in a workplane
    Vertical {
        id: ConstraintId,
        group: Group,
        point1: EntityId,
        point2: EntityId,
        workplane: EntityId,
    },

    /// Distance between two points, measured in 3D or projected onto a workplane
    Distance {
        id: ConstraintId,
        group: Group,
        point1: EntityId,
        point2: EntityId,
        value: f64,
        workplane: Option<EntityId>,
    },

    /// Two points are at the same location, in 3D or in a workplane's frame
    Coincident {
        id: ConstraintId,
        group: Group,
        point1: EntityId,
        point2: EntityId,
        workplane: Option<EntityId>,
    },

    /// A point's params are user input for the next solve
    Dragged {
        id: ConstraintId,
        group: Group,
        point: EntityId,
    },
}

impl SketchConstraint {
    /// Get the unique ID of this constraint
    pub fn id(&self) -> ConstraintId {
        match self {
            SketchConstraint::Horizontal { id, .. } => *id,
            SketchConstraint::Vertical { id, .. } => *id,
            SketchConstraint::Distance { id, .. } => *id,
            SketchConstraint::Coincident { id, .. } => *id,
            SketchConstraint::Dragged { id, .. } => *id,
        }
    }

    pub fn group(&self) -> Group {
        match self {
            SketchConstraint::Horizontal { group, .. } => *group,
            SketchConstraint::Vertical { group, .. } => *group,
            SketchConstraint::Distance { group, .. } => *group,
            SketchConstraint::Coincident { group, .. } => *group,
            SketchConstraint::Dragged { group, .. } => *group,
        }
    }

    /// Get the type name of this constraint
    pub fn type_name(&self) -> &'static str {
        match self {
            SketchConstraint::Horizontal { .. } => "Horizontal",
            SketchConstraint::Vertical { .. } => "Vertical",
            SketchConstraint::Distance { .. } => "Distance",
            SketchConstraint::Coincident { .. } => "Coincident",
            SketchConstraint::Dragged { .. } => "Dragged",
        }
    }

    /// Get all entity IDs referenced by this constraint
    pub fn referenced_entities(&self) -> Vec<EntityId> {
        match self {
            SketchConstraint::Horizontal {
                point1,
                point2,
                workplane,
                ..
            }
            | SketchConstraint::Vertical {
                point1,
                point2,
                workplane,
                ..
            } => vec![*point1, *point2, *workplane],
            SketchConstraint::Distance {
                point1,
                point2,
                workplane,
                ..
            }
            | SketchConstraint::Coincident {
                point1,
                point2,
                workplane,
                ..
            } => {
                let mut ids = vec![*point1, *point2];
                ids.extend(*workplane);
                ids
            }
            SketchConstraint::Dragged { point, .. } => vec![*point],
        }
    }

    /// Check if this constraint references a specific entity
    pub fn references_entity(&self, entity: EntityId) -> bool {
        self.referenced_entities().contains(&entity)
    }

    /// Number of scalar equations this constraint contributes
    pub fn equation_count(&self) -> usize {
        match self {
            SketchConstraint::Horizontal { .. } => 1,
            SketchConstraint::Vertical { .. } => 1,
            SketchConstraint::Distance { .. } => 1,
            SketchConstraint::Coincident { workplane, .. } => {
                if workplane.is_some() {
                    2
                } else {
                    3
                }
            }
            SketchConstraint::Dragged { .. } => 0,
        }
    }
}
