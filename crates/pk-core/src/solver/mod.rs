//! Model-to-solver bridge
//!
//! - [`SolverPart`]: parametrizes one part with workplanes and 2D points
//! - [`assemble_constraints`]: registers the model's coincident constraints
//! - [`SolveDriver`]: owns the engine session and runs build, solve and apply

mod assembler;
mod driver;
mod engine;
mod part;

pub use assembler::{SolverConstraint, assemble_constraints};
pub use driver::{SolveDriver, SolveState};
pub use engine::SolverEngine;
pub use part::{SolverPart, SolverVertex, SolverWorkplane};

use pk_sketch::{EntityId, SketchError, SolveResult};
use thiserror::Error;

use crate::model::{Corner, ModelError, VertexRef};

/// Solver bridge errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// An operation was called before a step it depends on
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The model and the solver session disagree
    #[error("Model and solver session out of sync: {0}")]
    Desync(String),

    #[error("Corner {0} maps to no workplane")]
    IllegalVertex(Corner),

    #[error("Vertex {0:?} belongs to no part in the model")]
    VertexNotFound(VertexRef),

    #[error("Solve failed: {0}")]
    SolveFailure(SolveResult),

    #[error("Entity {entity} has {found} params, expected {expected}")]
    ParamShape {
        entity: EntityId,
        expected: usize,
        found: usize,
    },

    #[error("Engine error: {0}")]
    Engine(#[from] SketchError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

/// Result type for solver bridge operations
pub type SolverResult<T> = Result<T, SolverError>;
