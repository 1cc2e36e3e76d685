//! Solving engine interface
//!
//! The bridge only talks to the numeric engine through [`SolverEngine`].
//! [`pk_sketch::Sketch`] is the implementation used by default.

use glam::{DQuat, DVec3};
use pk_sketch::{
    ConstraintId as EngineConstraint, EntityId, Group, ParamId, Sketch, SketchResult,
    SolveResult,
};

/// Operations the bridge needs from a workplane constraint engine
pub trait SolverEngine {
    /// Discard all entities and constraints
    fn clear_sketch(&mut self);

    /// Add a 3D point
    fn add_point_3d(&mut self, group: Group, position: DVec3) -> EntityId;

    /// Add an orientation entity
    fn add_normal_3d(&mut self, group: Group, rotation: DQuat) -> EntityId;

    /// Add a workplane anchored at a point and oriented by a normal
    fn add_workplane(
        &mut self,
        group: Group,
        origin: EntityId,
        normal: EntityId,
    ) -> SketchResult<EntityId>;

    /// Add a point with (u, v) coordinates on a workplane
    fn add_point_2d(
        &mut self,
        group: Group,
        workplane: EntityId,
        u: f64,
        v: f64,
    ) -> SketchResult<EntityId>;

    /// Same V coordinate in the workplane frame
    fn horizontal(
        &mut self,
        group: Group,
        a: EntityId,
        b: EntityId,
        workplane: EntityId,
    ) -> SketchResult<EngineConstraint>;

    /// Same U coordinate in the workplane frame
    fn vertical(
        &mut self,
        group: Group,
        a: EntityId,
        b: EntityId,
        workplane: EntityId,
    ) -> SketchResult<EngineConstraint>;

    /// Fixed distance, measured in 3D when `workplane` is `None`
    fn distance(
        &mut self,
        group: Group,
        a: EntityId,
        b: EntityId,
        value: f64,
        workplane: Option<EntityId>,
    ) -> SketchResult<EngineConstraint>;

    /// Coincidence, in 3D when `workplane` is `None`
    fn coincident(
        &mut self,
        group: Group,
        a: EntityId,
        b: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<EngineConstraint>;

    /// Pin a point for the next solve
    fn dragged(&mut self, group: Group, point: EntityId) -> SketchResult<EngineConstraint>;

    /// Scalar params of an entity, in coordinate order
    fn params(&self, entity: EntityId) -> SketchResult<Vec<ParamId>>;

    fn set_param_value(&mut self, param: ParamId, value: f64) -> SketchResult<()>;

    fn param_value(&self, param: ParamId) -> SketchResult<f64>;

    /// Solve every constraint of `group`
    fn solve_sketch(&mut self, group: Group, force_all: bool) -> SolveResult;
}

impl SolverEngine for Sketch {
    fn clear_sketch(&mut self) {
        self.clear();
    }

    fn add_point_3d(&mut self, group: Group, position: DVec3) -> EntityId {
        Sketch::add_point_3d(self, group, position)
    }

    fn add_normal_3d(&mut self, group: Group, rotation: DQuat) -> EntityId {
        Sketch::add_normal_3d(self, group, rotation)
    }

    fn add_workplane(
        &mut self,
        group: Group,
        origin: EntityId,
        normal: EntityId,
    ) -> SketchResult<EntityId> {
        Sketch::add_workplane(self, group, origin, normal)
    }

    fn add_point_2d(
        &mut self,
        group: Group,
        workplane: EntityId,
        u: f64,
        v: f64,
    ) -> SketchResult<EntityId> {
        Sketch::add_point_2d(self, group, workplane, u, v)
    }

    fn horizontal(
        &mut self,
        group: Group,
        a: EntityId,
        b: EntityId,
        workplane: EntityId,
    ) -> SketchResult<EngineConstraint> {
        Sketch::horizontal(self, group, a, b, workplane)
    }

    fn vertical(
        &mut self,
        group: Group,
        a: EntityId,
        b: EntityId,
        workplane: EntityId,
    ) -> SketchResult<EngineConstraint> {
        Sketch::vertical(self, group, a, b, workplane)
    }

    fn distance(
        &mut self,
        group: Group,
        a: EntityId,
        b: EntityId,
        value: f64,
        workplane: Option<EntityId>,
    ) -> SketchResult<EngineConstraint> {
        Sketch::distance(self, group, a, b, value, workplane)
    }

    fn coincident(
        &mut self,
        group: Group,
        a: EntityId,
        b: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<EngineConstraint> {
        Sketch::coincident(self, group, a, b, workplane)
    }

    fn dragged(&mut self, group: Group, point: EntityId) -> SketchResult<EngineConstraint> {
        Sketch::dragged(self, group, point)
    }

    fn params(&self, entity: EntityId) -> SketchResult<Vec<ParamId>> {
        self.params_of(entity).map(|params| params.to_vec())
    }

    fn set_param_value(&mut self, param: ParamId, value: f64) -> SketchResult<()> {
        self.set_param(param, value)
    }

    fn param_value(&self, param: ParamId) -> SketchResult<f64> {
        self.param(param)
    }

    fn solve_sketch(&mut self, group: Group, force_all: bool) -> SolveResult {
        self.solve(group, force_all)
    }
}
