//! Constraint graph assembly
//!
//! Turns the model's vertex-level coincident constraints into 3D coincidence
//! constraints between solver vertices once every part is parametrized.

use std::collections::HashMap;

use pk_sketch::{ConstraintId as EngineConstraint, EntityId, Group};
use tracing::{debug, warn};

use super::engine::SolverEngine;
use super::part::SolverPart;
use super::{SolverError, SolverResult};
use crate::model::{ConstraintId, Model, Side, VertexRef};

/// A model constraint as registered in the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverConstraint {
    pub constraint: ConstraintId,
    pub vertex1: VertexRef,
    pub vertex2: VertexRef,
    pub handle: EngineConstraint,
}

/// Both sides of a model constraint, filled in as solver vertices are scanned
#[derive(Debug, Default)]
struct Pending {
    vertex1: Option<EntityId>,
    vertex2: Option<EntityId>,
}

/// Register every model constraint with the engine.
///
/// Fails with [`SolverError::Desync`] when a constraint has a side whose part
/// was never parametrized.
pub fn assemble_constraints<E: SolverEngine>(
    model: &Model,
    parts: &[SolverPart],
    engine: &mut E,
) -> SolverResult<Vec<SolverConstraint>> {
    let mut order: Vec<ConstraintId> = Vec::new();
    let mut pending: HashMap<ConstraintId, Pending> = HashMap::new();

    for solver_part in parts {
        for vertex in solver_part.vertices() {
            let vertex_ref = VertexRef::new(solver_part.part(), vertex.corner());
            for &cid in model.constraints_at(vertex_ref) {
                let constraint = model.constraint(cid).ok_or_else(|| {
                    SolverError::Desync(format!(
                        "vertex {vertex_ref:?} lists unknown constraint {cid:?}"
                    ))
                })?;
                let entry = pending.entry(cid).or_insert_with(|| {
                    order.push(cid);
                    Pending::default()
                });
                match constraint.side_of(vertex_ref) {
                    Some(Side::Vertex1) => entry.vertex1 = Some(vertex.point()),
                    Some(Side::Vertex2) => entry.vertex2 = Some(vertex.point()),
                    None => {
                        return Err(SolverError::Desync(format!(
                            "constraint {cid:?} is registered on {vertex_ref:?} but does not touch it"
                        )));
                    }
                }
            }
        }
    }

    // Constraints no solver vertex mentions were never reached at all
    for (cid, _) in model.constraints() {
        if !pending.contains_key(&cid) {
            warn!("Constraint {:?} touches no parametrized part", cid);
            return Err(SolverError::Desync(format!(
                "constraint {cid:?} touches no parametrized part"
            )));
        }
    }

    let mut assembled = Vec::with_capacity(order.len());
    for cid in order {
        let Some(constraint) = model.constraint(cid) else {
            continue;
        };
        let sides = &pending[&cid];
        let (Some(a), Some(b)) = (sides.vertex1, sides.vertex2) else {
            let missing = if sides.vertex1.is_none() {
                constraint.vertex1()
            } else {
                constraint.vertex2()
            };
            warn!(
                "Constraint {:?} has an unresolved side at {:?}",
                cid, missing
            );
            return Err(SolverError::Desync(format!(
                "constraint {cid:?} references part {:?}, which is not in the sketch",
                missing.part
            )));
        };
        let handle = engine.coincident(Group::SOLVE, a, b, None)?;
        assembled.push(SolverConstraint {
            constraint: cid,
            vertex1: constraint.vertex1(),
            vertex2: constraint.vertex2(),
            handle,
        });
    }

    debug!("Assembled {} coincident constraints", assembled.len());
    Ok(assembled)
}
