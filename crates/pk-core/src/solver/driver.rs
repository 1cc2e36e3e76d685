//! Solve/apply driver
//!
//! One [`SolveDriver`] owns one engine session. A session is created by
//! [`SolveDriver::build_sketch`] and moves through
//! `Empty -> Built -> Solved -> Applied`; [`SolveDriver::update`] re-enters
//! `Built` without touching the session's topology.

use std::collections::HashMap;

use glam::DVec3;
use pk_sketch::{ConstraintSolver, Group, Sketch, SolveResult};
use tracing::{debug, warn};

use super::assembler::{SolverConstraint, assemble_constraints};
use super::engine::SolverEngine;
use super::part::SolverPart;
use super::{SolverError, SolverResult};
use crate::config::DriverConfig;
use crate::geometry::Line;
use crate::model::{Model, PartId, VertexRef};

/// Lifecycle of a solving session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolveState {
    #[default]
    Empty,
    Built,
    Solved,
    Applied,
}

/// Entities of one `build_sketch` call
#[derive(Debug)]
struct Session {
    parts: Vec<SolverPart>,
    index: HashMap<PartId, usize>,
    constraints: Vec<SolverConstraint>,
    state: SolveState,
    /// Model revisions the engine's params were last synchronized with
    structure_revision: u64,
    geometry_revision: u64,
}

impl Session {
    fn part(&self, vertex: VertexRef) -> SolverResult<&SolverPart> {
        self.index
            .get(&vertex.part)
            .map(|&i| &self.parts[i])
            .ok_or(SolverError::VertexNotFound(vertex))
    }
}

/// Drives build, solve and apply against a solving engine
#[derive(Debug)]
pub struct SolveDriver<E: SolverEngine = Sketch> {
    engine: E,
    config: DriverConfig,
    session: Option<Session>,
}

impl SolveDriver<Sketch> {
    pub fn new() -> Self {
        Self::with_config(DriverConfig::default())
    }

    /// Create a driver whose engine uses the configured solver settings
    pub fn with_config(config: DriverConfig) -> Self {
        let engine = Sketch::with_solver(ConstraintSolver::with_config(config.solver.clone()));
        Self::with_engine(engine, config)
    }
}

impl Default for SolveDriver<Sketch> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: SolverEngine> SolveDriver<E> {
    pub fn with_engine(engine: E, config: DriverConfig) -> Self {
        Self {
            engine,
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn state(&self) -> SolveState {
        self.session
            .as_ref()
            .map_or(SolveState::Empty, |s| s.state)
    }

    /// Discard the session and everything in the engine
    pub fn reset(&mut self) {
        self.engine.clear_sketch();
        self.session = None;
    }

    /// Parametrize every part, pin `dragged` and register all constraints.
    ///
    /// Any failure clears the engine and leaves the driver `Empty`.
    pub fn build_sketch(&mut self, model: &Model, dragged: &[VertexRef]) -> SolverResult<()> {
        self.reset();
        match self.populate(model, dragged) {
            Ok(session) => {
                debug!(
                    "Built sketch: {} parts, {} constraints, {} dragged vertices",
                    session.parts.len(),
                    session.constraints.len(),
                    dragged.len()
                );
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                self.engine.clear_sketch();
                Err(e)
            }
        }
    }

    fn populate(&mut self, model: &Model, dragged: &[VertexRef]) -> SolverResult<Session> {
        let mut parts = Vec::with_capacity(model.part_count());
        let mut index = HashMap::with_capacity(model.part_count());
        for (id, part) in model.parts() {
            let mut solver_part = SolverPart::new(id);
            solver_part.add_to_solver(&mut self.engine, part)?;
            index.insert(id, parts.len());
            parts.push(solver_part);
        }

        for &vertex in dragged {
            let i = *index
                .get(&vertex.part)
                .ok_or(SolverError::VertexNotFound(vertex))?;
            parts[i].set_dragged(&mut self.engine, vertex.corner, true)?;
        }

        let constraints = assemble_constraints(model, &parts, &mut self.engine)?;

        Ok(Session {
            parts,
            index,
            constraints,
            state: SolveState::Built,
            structure_revision: model.structure_revision(),
            geometry_revision: model.geometry_revision(),
        })
    }

    /// Push current part geometry into the session as a warm start.
    ///
    /// Does nothing without a session. Parts or constraints added or removed
    /// since the build make this a [`SolverError::Desync`].
    pub fn update(&mut self, model: &Model) -> SolverResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if model.structure_revision() != session.structure_revision {
            warn!("Model structure changed since the sketch was built");
            return Err(SolverError::Desync(
                "parts or constraints changed since build_sketch".into(),
            ));
        }

        for solver_part in &session.parts {
            let part = model.part(solver_part.part()).ok_or_else(|| {
                SolverError::Desync(format!("part {:?} left the model", solver_part.part()))
            })?;
            solver_part.update(&mut self.engine, part)?;
        }
        session.geometry_revision = model.geometry_revision();
        session.state = SolveState::Built;
        debug!("Updated {} parts", session.parts.len());
        Ok(())
    }

    /// Move a pinned vertex's solver point to a world target
    pub fn drag_vertex(&mut self, vertex: VertexRef, target: DVec3) -> SolverResult<()> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| SolverError::Precondition("drag_vertex before build_sketch".into()))?;
        let solver_part = session.part(vertex)?;
        let pinned = solver_part
            .vertex(vertex.corner)
            .is_some_and(|v| v.is_dragged());
        if !pinned {
            return Err(SolverError::Precondition(format!(
                "vertex {vertex:?} was not pinned by build_sketch"
            )));
        }
        solver_part.move_vertex(&mut self.engine, vertex.corner, target)?;
        session.state = SolveState::Built;
        Ok(())
    }

    /// Drag a pinned vertex to where `line` meets the plane of its face.
    ///
    /// Returns `false` and leaves the session untouched when the line is
    /// parallel to the face.
    pub fn drag_vertex_along(&mut self, vertex: VertexRef, line: &Line) -> SolverResult<bool> {
        let session = self.session.as_ref().ok_or_else(|| {
            SolverError::Precondition("drag_vertex_along before build_sketch".into())
        })?;
        let plane = session
            .part(vertex)?
            .face_plane(&self.engine, vertex.corner)?;
        match plane.intersect_line(line) {
            Some(target) => {
                self.drag_vertex(vertex, target)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run the engine on the solve group.
    ///
    /// A non-success result is returned as [`SolverError::SolveFailure`]; the
    /// engine has already restored its params and the session stays `Built`.
    pub fn solve(&mut self) -> SolverResult<SolveResult> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| SolverError::Precondition("solve before build_sketch".into()))?;

        let result = self.engine.solve_sketch(Group::SOLVE, self.config.force_all);
        if result.is_ok() {
            debug!("Solved: {}", result);
            session.state = SolveState::Solved;
            Ok(result)
        } else {
            warn!("Solve failed: {}", result);
            session.state = SolveState::Built;
            Err(SolverError::SolveFailure(result))
        }
    }

    /// Write solved geometry back onto every part.
    ///
    /// Nothing is written unless every part's geometry could be read back.
    pub fn apply(&mut self, model: &mut Model) -> SolverResult<()> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| SolverError::Precondition("apply before build_sketch".into()))?;
        if !matches!(session.state, SolveState::Solved | SolveState::Applied) {
            return Err(SolverError::Precondition(format!(
                "apply in state {:?}, expected a successful solve",
                session.state
            )));
        }
        if model.structure_revision() != session.structure_revision {
            return Err(SolverError::Desync(
                "parts or constraints changed since build_sketch".into(),
            ));
        }
        if model.geometry_revision() != session.geometry_revision {
            warn!("Parts were edited outside the driver since the last update");
            return Err(SolverError::Desync(
                "parts were edited since the last update".into(),
            ));
        }

        let mut solved = Vec::with_capacity(session.parts.len());
        for solver_part in &session.parts {
            let (position, size) = solver_part.solved_geometry(&self.engine)?;
            solved.push((solver_part.part(), position, size));
        }
        for (id, position, size) in solved {
            model.set_part_geometry(id, position, size)?;
        }

        session.geometry_revision = model.geometry_revision();
        session.state = SolveState::Applied;
        debug!("Applied {} parts", session.parts.len());
        Ok(())
    }

    pub fn solver_part(&self, id: PartId) -> Option<&SolverPart> {
        let session = self.session.as_ref()?;
        session.index.get(&id).map(|&i| &session.parts[i])
    }

    pub fn solver_parts(&self) -> &[SolverPart] {
        self.session.as_ref().map_or(&[], |s| s.parts.as_slice())
    }

    pub fn constraints(&self) -> &[SolverConstraint] {
        self.session
            .as_ref()
            .map_or(&[], |s| s.constraints.as_slice())
    }

    /// World position of a vertex as currently held by the engine
    pub fn vertex_position(&self, vertex: VertexRef) -> SolverResult<DVec3> {
        let session = self.session.as_ref().ok_or_else(|| {
            SolverError::Precondition("vertex_position before build_sketch".into())
        })?;
        session
            .part(vertex)?
            .vertex_position(&self.engine, vertex.corner)
    }
}
