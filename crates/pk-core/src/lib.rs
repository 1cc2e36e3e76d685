//! Panel and beam assemblies
//!
//! This crate provides:
//! - Parts (oriented rectangular prisms) and coincident corner constraints
//! - Per-part parametrization on workplanes for the constraint engine
//! - A driver that builds, solves and applies a solving session
//! - RON project files and driver configuration

pub mod config;
pub mod geometry;
pub mod model;
pub mod project;
pub mod solver;

// Re-exports for convenience
pub use config::{ConfigError, DriverConfig};
pub use geometry::{Line, Plane};
pub use model::{
    CoincidentConstraint, ConstraintId, Corner, Model, ModelError, ModelEvent, ModelResult, Part,
    PartId, PartKind, PartVertex, VertexRef,
};
pub use project::{Project, ProjectError};
pub use solver::{SolveDriver, SolveState, SolverEngine, SolverError, SolverResult};
