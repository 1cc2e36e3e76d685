//! Workplane Constraint Engine
//!
//! This crate provides:
//! - Params, points, normals and workplanes in a 3D sketch
//! - Horizontal, vertical, distance, coincident and dragged constraints
//! - Constraint solver using Newton-Raphson iteration with minimum-norm steps,
//!   solving independent components on sparse Jacobians
//! - Solve groups separating constant reference geometry from unknowns

pub mod constraint;
pub mod entity;
pub mod sketch;
pub mod solver;
mod sparse;

// Re-exports for convenience
pub use constraint::{ConstraintId, SketchConstraint};
pub use entity::{EntityId, Group, Param, ParamId, SketchEntity};
pub use sketch::{Frame, Sketch, SketchError, SketchResult};
pub use solver::{ConstraintSolver, SolveResult, SolverConfig};
