//! Sketch storage
//!
//! Owns the params, entities and constraints of one solving session and
//! evaluates point positions and constraint residuals from param values.

use glam::{DQuat, DVec2, DVec3};
use thiserror::Error;

use crate::constraint::{ConstraintId, SketchConstraint};
use crate::entity::{EntityId, Group, Param, ParamId, SketchEntity};
use crate::solver::{ConstraintSolver, SolveResult};

/// Sketch-related errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SketchError {
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Entity {entity} is a {found}, expected a {expected}")]
    WrongEntityKind {
        entity: EntityId,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Param not found: {0:?}")]
    ParamNotFound(ParamId),

    #[error("Constraint not found: {0}")]
    ConstraintNotFound(ConstraintId),
}

/// Result type for sketch operations
pub type SketchResult<T> = Result<T, SketchError>;

/// Placement of a workplane in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub origin: DVec3,
    pub rotation: DQuat,
}

impl Frame {
    pub fn u_axis(&self) -> DVec3 {
        self.rotation * DVec3::X
    }

    pub fn v_axis(&self) -> DVec3 {
        self.rotation * DVec3::Y
    }

    pub fn normal(&self) -> DVec3 {
        self.rotation * DVec3::Z
    }

    /// World position of plane-local coordinates
    pub fn point_at(&self, u: f64, v: f64) -> DVec3 {
        self.origin + self.rotation * DVec3::new(u, v, 0.0)
    }

    /// Plane-local coordinates of a world position (projected onto the plane)
    pub fn project(&self, point: DVec3) -> DVec2 {
        let d = point - self.origin;
        DVec2::new(d.dot(self.u_axis()), d.dot(self.v_axis()))
    }
}

/// A constraint sketch in 3D built from points placed on workplanes
#[derive(Debug, Clone, Default)]
pub struct Sketch {
    params: Vec<Param>,
    entities: Vec<SketchEntity>,
    constraints: Vec<SketchConstraint>,
    solver: ConstraintSolver,
}

impl Sketch {
    /// Create an empty sketch with the default solver
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty sketch with a configured solver
    pub fn with_solver(solver: ConstraintSolver) -> Self {
        Self {
            solver,
            ..Self::default()
        }
    }

    pub fn solver(&self) -> &ConstraintSolver {
        &self.solver
    }

    pub fn set_solver(&mut self, solver: ConstraintSolver) {
        self.solver = solver;
    }

    /// Discard every param, entity and constraint
    pub fn clear(&mut self) {
        self.params.clear();
        self.entities.clear();
        self.constraints.clear();
    }

    // ============== Entities ==============

    /// Add a free 3D point
    pub fn add_point_3d(&mut self, group: Group, position: DVec3) -> EntityId {
        let params = [
            self.push_param(group, position.x),
            self.push_param(group, position.y),
            self.push_param(group, position.z),
        ];
        let id = self.next_entity_id();
        self.entities
            .push(SketchEntity::Point3d { id, group, params });
        id
    }

    /// Add an orientation entity
    pub fn add_normal_3d(&mut self, group: Group, rotation: DQuat) -> EntityId {
        let params = [
            self.push_param(group, rotation.w),
            self.push_param(group, rotation.x),
            self.push_param(group, rotation.y),
            self.push_param(group, rotation.z),
        ];
        let id = self.next_entity_id();
        self.entities
            .push(SketchEntity::Normal3d { id, group, params });
        id
    }

    /// Add a workplane anchored at a point entity and oriented by a normal entity
    pub fn add_workplane(
        &mut self,
        group: Group,
        origin: EntityId,
        normal: EntityId,
    ) -> SketchResult<EntityId> {
        self.expect_point(origin)?;
        self.expect_kind(normal, "Normal3d")?;
        let id = self.next_entity_id();
        self.entities.push(SketchEntity::Workplane {
            id,
            group,
            origin,
            normal,
        });
        Ok(id)
    }

    /// Add a point with plane-local coordinates on a workplane
    pub fn add_point_2d(
        &mut self,
        group: Group,
        workplane: EntityId,
        u: f64,
        v: f64,
    ) -> SketchResult<EntityId> {
        self.expect_kind(workplane, "Workplane")?;
        let params = [self.push_param(group, u), self.push_param(group, v)];
        let id = self.next_entity_id();
        self.entities.push(SketchEntity::Point2d {
            id,
            group,
            workplane,
            params,
        });
        Ok(id)
    }

    // ============== Constraints ==============

    /// Constrain two points to the same V coordinate of a workplane
    pub fn horizontal(
        &mut self,
        group: Group,
        point1: EntityId,
        point2: EntityId,
        workplane: EntityId,
    ) -> SketchResult<ConstraintId> {
        self.expect_point(point1)?;
        self.expect_point(point2)?;
        self.expect_kind(workplane, "Workplane")?;
        let id = self.next_constraint_id();
        self.constraints.push(SketchConstraint::Horizontal {
            id,
            group,
            point1,
            point2,
            workplane,
        });
        Ok(id)
    }

    /// Constrain two points to the same U coordinate of a workplane
    pub fn vertical(
        &mut self,
        group: Group,
        point1: EntityId,
        point2: EntityId,
        workplane: EntityId,
    ) -> SketchResult<ConstraintId> {
        self.expect_point(point1)?;
        self.expect_point(point2)?;
        self.expect_kind(workplane, "Workplane")?;
        let id = self.next_constraint_id();
        self.constraints.push(SketchConstraint::Vertical {
            id,
            group,
            point1,
            point2,
            workplane,
        });
        Ok(id)
    }

    /// Constrain the distance between two points
    pub fn distance(
        &mut self,
        group: Group,
        point1: EntityId,
        point2: EntityId,
        value: f64,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.expect_point(point1)?;
        self.expect_point(point2)?;
        if let Some(workplane) = workplane {
            self.expect_kind(workplane, "Workplane")?;
        }
        let id = self.next_constraint_id();
        self.constraints.push(SketchConstraint::Distance {
            id,
            group,
            point1,
            point2,
            value,
            workplane,
        });
        Ok(id)
    }

    /// Constrain two points to coincide
    pub fn coincident(
        &mut self,
        group: Group,
        point1: EntityId,
        point2: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.expect_point(point1)?;
        self.expect_point(point2)?;
        if let Some(workplane) = workplane {
            self.expect_kind(workplane, "Workplane")?;
        }
        let id = self.next_constraint_id();
        self.constraints.push(SketchConstraint::Coincident {
            id,
            group,
            point1,
            point2,
            workplane,
        });
        Ok(id)
    }

    /// Mark a point as dragged for the next solve of `group`
    pub fn dragged(&mut self, group: Group, point: EntityId) -> SketchResult<ConstraintId> {
        self.expect_point(point)?;
        let id = self.next_constraint_id();
        self.constraints
            .push(SketchConstraint::Dragged { id, group, point });
        Ok(id)
    }

    // ============== Accessors ==============

    pub fn entity(&self, id: EntityId) -> Option<&SketchEntity> {
        self.entities.get(id.index())
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&SketchConstraint> {
        self.constraints.get(id.index())
    }

    pub fn entities_iter(&self) -> impl Iterator<Item = &SketchEntity> {
        self.entities.iter()
    }

    pub fn constraints_iter(&self) -> impl Iterator<Item = &SketchConstraint> {
        self.constraints.iter()
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Scalar params owned by an entity
    pub fn params_of(&self, id: EntityId) -> SketchResult<&[ParamId]> {
        self.entity(id)
            .map(SketchEntity::params)
            .ok_or(SketchError::EntityNotFound(id))
    }

    /// Read a param value
    pub fn param(&self, id: ParamId) -> SketchResult<f64> {
        self.params
            .get(id.index())
            .map(|p| p.value)
            .ok_or(SketchError::ParamNotFound(id))
    }

    /// Overwrite a param value
    pub fn set_param(&mut self, id: ParamId, value: f64) -> SketchResult<()> {
        let param = self
            .params
            .get_mut(id.index())
            .ok_or(SketchError::ParamNotFound(id))?;
        param.value = value;
        Ok(())
    }

    pub fn param_group(&self, id: ParamId) -> SketchResult<Group> {
        self.params
            .get(id.index())
            .map(|p| p.group)
            .ok_or(SketchError::ParamNotFound(id))
    }

    /// World position of a point entity from the current param values
    pub fn point_position(&self, id: EntityId) -> SketchResult<DVec3> {
        self.expect_point(id)?;
        let values = self.values();
        Ok(Evaluator::new(self, &values).point_position(id))
    }

    /// World placement of a workplane from the current param values
    pub fn workplane_frame(&self, id: EntityId) -> SketchResult<Frame> {
        self.expect_kind(id, "Workplane")?;
        let values = self.values();
        Ok(Evaluator::new(self, &values).frame(id))
    }

    /// Solve the constraints of `group` with the sketch's solver
    pub fn solve(&mut self, group: Group, force_all: bool) -> SolveResult {
        let solver = self.solver.clone();
        solver.solve(self, group, force_all)
    }

    // ============== Internal ==============

    pub(crate) fn values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }

    pub(crate) fn write_values(&mut self, values: &[f64]) {
        for (param, value) in self.params.iter_mut().zip(values) {
            param.value = *value;
        }
    }

    pub(crate) fn params_table(&self) -> &[Param] {
        &self.params
    }

    fn push_param(&mut self, group: Group, value: f64) -> ParamId {
        let id = ParamId(self.params.len() as u32);
        self.params.push(Param { group, value });
        id
    }

    fn next_entity_id(&self) -> EntityId {
        EntityId(self.entities.len() as u32)
    }

    fn next_constraint_id(&self) -> ConstraintId {
        ConstraintId(self.constraints.len() as u32)
    }

    fn expect_point(&self, id: EntityId) -> SketchResult<()> {
        let entity = self.entity(id).ok_or(SketchError::EntityNotFound(id))?;
        if entity.is_point() {
            Ok(())
        } else {
            Err(SketchError::WrongEntityKind {
                entity: id,
                expected: "point",
                found: entity.type_name(),
            })
        }
    }

    fn expect_kind(&self, id: EntityId, expected: &'static str) -> SketchResult<()> {
        let entity = self.entity(id).ok_or(SketchError::EntityNotFound(id))?;
        if entity.type_name() == expected {
            Ok(())
        } else {
            Err(SketchError::WrongEntityKind {
                entity: id,
                expected,
                found: entity.type_name(),
            })
        }
    }
}

/// Evaluates geometry from a param value table without touching the sketch
pub(crate) struct Evaluator<'a> {
    sketch: &'a Sketch,
    values: &'a [f64],
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(sketch: &'a Sketch, values: &'a [f64]) -> Self {
        Self { sketch, values }
    }

    fn value(&self, id: ParamId) -> f64 {
        self.values.get(id.index()).copied().unwrap_or(0.0)
    }

    fn rotation(&self, normal: EntityId) -> DQuat {
        match self.sketch.entity(normal) {
            Some(SketchEntity::Normal3d { params, .. }) => {
                let q = DQuat::from_xyzw(
                    self.value(params[1]),
                    self.value(params[2]),
                    self.value(params[3]),
                    self.value(params[0]),
                );
                if q.length_squared() > 1e-24 {
                    q.normalize()
                } else {
                    DQuat::IDENTITY
                }
            }
            _ => DQuat::IDENTITY,
        }
    }

    pub(crate) fn frame(&self, workplane: EntityId) -> Frame {
        match self.sketch.entity(workplane) {
            Some(SketchEntity::Workplane { origin, normal, .. }) => Frame {
                origin: self.point_position(*origin),
                rotation: self.rotation(*normal),
            },
            _ => Frame {
                origin: DVec3::ZERO,
                rotation: DQuat::IDENTITY,
            },
        }
    }

    /// Entity references always point backwards, so the recursion through
    /// workplane origins terminates.
    pub(crate) fn point_position(&self, id: EntityId) -> DVec3 {
        match self.sketch.entity(id) {
            Some(SketchEntity::Point3d { params, .. }) => DVec3::new(
                self.value(params[0]),
                self.value(params[1]),
                self.value(params[2]),
            ),
            Some(SketchEntity::Point2d {
                workplane, params, ..
            }) => self
                .frame(*workplane)
                .point_at(self.value(params[0]), self.value(params[1])),
            _ => DVec3::ZERO,
        }
    }

    /// Append the residuals of one constraint (zero when satisfied)
    pub(crate) fn residuals(&self, constraint: &SketchConstraint, out: &mut Vec<f64>) {
        match constraint {
            SketchConstraint::Horizontal {
                point1,
                point2,
                workplane,
                ..
            } => {
                let d = self.point_position(*point1) - self.point_position(*point2);
                out.push(d.dot(self.frame(*workplane).v_axis()));
            }

            SketchConstraint::Vertical {
                point1,
                point2,
                workplane,
                ..
            } => {
                let d = self.point_position(*point1) - self.point_position(*point2);
                out.push(d.dot(self.frame(*workplane).u_axis()));
            }

            SketchConstraint::Distance {
                point1,
                point2,
                value,
                workplane,
                ..
            } => {
                let d = self.point_position(*point1) - self.point_position(*point2);
                let length = match workplane {
                    Some(workplane) => {
                        let frame = self.frame(*workplane);
                        DVec2::new(d.dot(frame.u_axis()), d.dot(frame.v_axis())).length()
                    }
                    None => d.length(),
                };
                out.push(length - value);
            }

            SketchConstraint::Coincident {
                point1,
                point2,
                workplane,
                ..
            } => {
                let d = self.point_position(*point1) - self.point_position(*point2);
                match workplane {
                    Some(workplane) => {
                        let frame = self.frame(*workplane);
                        out.push(d.dot(frame.u_axis()));
                        out.push(d.dot(frame.v_axis()));
                    }
                    None => {
                        out.push(d.x);
                        out.push(d.y);
                        out.push(d.z);
                    }
                }
            }

            SketchConstraint::Dragged { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane_sketch(rotation: DQuat) -> (Sketch, EntityId) {
        let mut sketch = Sketch::new();
        let origin = sketch.add_point_3d(Group::CONSTANT, DVec3::new(1.0, 2.0, 3.0));
        let normal = sketch.add_normal_3d(Group::CONSTANT, rotation);
        let plane = sketch
            .add_workplane(Group::CONSTANT, origin, normal)
            .unwrap();
        (sketch, plane)
    }

    #[test]
    fn test_point_2d_world_position() {
        let (mut sketch, plane) =
            plane_sketch(DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2));
        let p = sketch.add_point_2d(Group::SOLVE, plane, 2.0, 0.0).unwrap();

        let world = sketch.point_position(p).unwrap();
        // U axis of the plane is world +Y after the rotation
        assert_relative_eq!(world.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(world.y, 4.0, epsilon = 1e-12);
        assert_relative_eq!(world.z, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_workplane_origin_on_other_plane() {
        let (mut sketch, plane) = plane_sketch(DQuat::IDENTITY);
        let normal = sketch.add_normal_3d(Group::CONSTANT, DQuat::IDENTITY);
        let anchor = sketch.add_point_2d(Group::SOLVE, plane, 5.0, 0.0).unwrap();
        let nested = sketch.add_workplane(Group::SOLVE, anchor, normal).unwrap();
        let p = sketch.add_point_2d(Group::SOLVE, nested, 1.0, 1.0).unwrap();

        let world = sketch.point_position(p).unwrap();
        assert_relative_eq!(world.x, 7.0, epsilon = 1e-12);
        assert_relative_eq!(world.y, 3.0, epsilon = 1e-12);
        assert_relative_eq!(world.z, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wrong_entity_kind_is_rejected() {
        let (mut sketch, plane) = plane_sketch(DQuat::IDENTITY);
        let p = sketch.add_point_2d(Group::SOLVE, plane, 0.0, 0.0).unwrap();

        let err = sketch.add_point_2d(Group::SOLVE, p, 0.0, 0.0).unwrap_err();
        assert!(matches!(
            err,
            SketchError::WrongEntityKind {
                expected: "Workplane",
                found: "Point2d",
                ..
            }
        ));

        let err = sketch.horizontal(Group::SOLVE, p, plane, plane).unwrap_err();
        assert!(matches!(err, SketchError::WrongEntityKind { .. }));
    }

    #[test]
    fn test_unknown_entity_is_rejected() {
        let mut sketch = Sketch::new();
        let err = sketch
            .coincident(Group::SOLVE, EntityId(0), EntityId(1), None)
            .unwrap_err();
        assert_eq!(err, SketchError::EntityNotFound(EntityId(0)));
    }

    #[test]
    fn test_param_read_write() {
        let mut sketch = Sketch::new();
        let p = sketch.add_point_3d(Group::SOLVE, DVec3::new(1.0, 2.0, 3.0));
        let params = sketch.params_of(p).unwrap().to_vec();
        assert_eq!(params.len(), 3);

        sketch.set_param(params[1], 9.0).unwrap();
        assert_eq!(sketch.param(params[1]).unwrap(), 9.0);
        assert_eq!(sketch.point_position(p).unwrap(), DVec3::new(1.0, 9.0, 3.0));
        assert_eq!(sketch.param_group(params[0]).unwrap(), Group::SOLVE);
    }

    #[test]
    fn test_clear_discards_everything() {
        let (mut sketch, plane) = plane_sketch(DQuat::IDENTITY);
        let p = sketch.add_point_2d(Group::SOLVE, plane, 0.0, 0.0).unwrap();
        sketch.dragged(Group::SOLVE, p).unwrap();

        sketch.clear();
        assert_eq!(sketch.param_count(), 0);
        assert_eq!(sketch.entity_count(), 0);
        assert_eq!(sketch.constraint_count(), 0);
    }

    #[test]
    fn test_frame_projection() {
        let (sketch, plane) = plane_sketch(DQuat::from_rotation_x(0.3));
        let frame = sketch.workplane_frame(plane).unwrap();
        let world = frame.point_at(2.5, -1.5);
        let uv = frame.project(world);
        assert_relative_eq!(uv.x, 2.5, epsilon = 1e-12);
        assert_relative_eq!(uv.y, -1.5, epsilon = 1e-12);
    }
}
