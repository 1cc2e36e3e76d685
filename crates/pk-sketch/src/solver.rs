//! Constraint Solver
//!
//! Newton iteration with a minimum-norm step for 3D sketches built from
//! workplane points. Unknowns are split into independent components, each
//! solved on a sparse Jacobian. Params that no equation depends on never
//! move, and dragged params are held fixed whenever the rest of their
//! component allows it.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constraint::{ConstraintId, SketchConstraint};
use crate::entity::{EntityId, Group, SketchEntity};
use crate::sketch::{Evaluator, Sketch};
use crate::sparse::SparseRows;

/// Diagonal regularization of the normal equations, relative to their scale
const REGULARIZATION: f64 = 1e-8;

/// A failed solve is inconsistent when the least-squares step leaves more
/// than this share of the residual
const INCONSISTENCY_RATIO: f64 = 1e-3;

/// Result of solving sketch constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolveResult {
    /// All constraints are satisfied, no degrees of freedom remain
    FullyConstrained,

    /// Constraints are satisfied, but some degrees of freedom remain
    UnderConstrained {
        /// Number of remaining degrees of freedom
        dof: u32,
    },

    /// Constraints contradict each other
    OverConstrained {
        /// Constraints left unsatisfied
        conflicts: Vec<ConstraintId>,
    },

    /// Solver failed to converge
    Failed {
        /// Reason for failure
        reason: String,
    },
}

impl SolveResult {
    /// Whether the constraints were satisfied
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            SolveResult::FullyConstrained | SolveResult::UnderConstrained { .. }
        )
    }

    /// Remaining degrees of freedom of a successful solve
    pub fn dof(&self) -> Option<u32> {
        match self {
            SolveResult::FullyConstrained => Some(0),
            SolveResult::UnderConstrained { dof } => Some(*dof),
            _ => None,
        }
    }
}

impl std::fmt::Display for SolveResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveResult::FullyConstrained => write!(f, "fully constrained"),
            SolveResult::UnderConstrained { dof } => {
                write!(f, "under-constrained ({dof} degrees of freedom)")
            }
            SolveResult::OverConstrained { conflicts } => {
                write!(f, "inconsistent ({} conflicting constraints)", conflicts.len())
            }
            SolveResult::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Numeric settings of the solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Largest residual accepted as satisfied
    pub tolerance: f64,
    /// Newton iterations per attempt at full damping
    pub max_iterations: usize,
    /// Fraction of each Newton step applied (0.1 - 1.0)
    pub damping: f64,
    /// Relative threshold for Jacobian rank detection
    pub rank_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 50,
            damping: 1.0,
            rank_tolerance: 1e-8,
        }
    }
}

/// Constraint solver using Newton-Raphson iteration
#[derive(Debug, Clone, Default)]
pub struct ConstraintSolver {
    config: SolverConfig,
}

impl ConstraintSolver {
    /// Create a new solver with default parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a solver from explicit settings
    pub fn with_config(config: SolverConfig) -> Self {
        Self::new()
            .with_tolerance(config.tolerance)
            .with_max_iterations(config.max_iterations)
            .with_damping(config.damping)
            .with_rank_tolerance(config.rank_tolerance)
    }

    /// Set the convergence tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Set the maximum iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the damping factor (0-1)
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.config.damping = damping.clamp(0.1, 1.0);
        self
    }

    pub fn with_rank_tolerance(mut self, rank_tolerance: f64) -> Self {
        self.config.rank_tolerance = rank_tolerance;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Newton iterations per attempt, scaled up by the inverse of the damping
    pub fn iteration_budget(&self) -> usize {
        (self.config.max_iterations as f64 / self.config.damping).ceil() as usize
    }

    /// Solve the constraints of `group`, moving only params of that group.
    ///
    /// Unknowns that share no equation are solved as separate components.
    /// With `force_all` a failed solve lists every unsatisfied constraint,
    /// otherwise only the first one. Param values are left untouched when
    /// any component fails.
    pub fn solve(&self, sketch: &mut Sketch, group: Group, force_all: bool) -> SolveResult {
        let system = System::build(sketch, group);
        let components = system.components(sketch);
        let mut values = sketch.values();

        let mut dof = 0;
        let mut failed = false;
        let mut inconsistent = false;
        let mut conflicts = Vec::new();
        for component in &components {
            match self.solve_component(sketch, component, &mut values) {
                Ok(component_dof) => dof += component_dof,
                Err(failure) => {
                    failed = true;
                    inconsistent |= failure.inconsistent;
                    conflicts.extend(failure.conflicts);
                }
            }
        }

        if failed {
            conflicts.sort_unstable();
            if !force_all {
                conflicts.truncate(1);
            }
            let result = if inconsistent {
                SolveResult::OverConstrained { conflicts }
            } else {
                SolveResult::Failed {
                    reason: format!(
                        "did not converge within {} iterations",
                        self.iteration_budget()
                    ),
                }
            };
            warn!("Sketch group {} did not solve: {}", group.0, result);
            return result;
        }

        debug!(
            components = components.len(),
            n_vars = system.unknowns.len(),
            n_equations = system.equation_rows(),
            dof,
            "Sketch group {} solved",
            group.0
        );
        sketch.write_values(&values);
        if dof == 0 {
            SolveResult::FullyConstrained
        } else {
            SolveResult::UnderConstrained { dof: dof as u32 }
        }
    }

    /// Solve one component in `values`, returning its remaining degrees of
    /// freedom
    fn solve_component(
        &self,
        sketch: &Sketch,
        component: &Component,
        values: &mut [f64],
    ) -> Result<usize, Failure> {
        let n_vars = component.unknowns.len();
        if component.equations.is_empty() {
            return Ok(n_vars);
        }

        let initial: Vec<f64> = component.unknowns.iter().map(|&p| values[p]).collect();
        let all = vec![true; n_vars];

        // Dragged params are first held in place; only if that cannot be
        // satisfied are they released.
        let mut attempts = Vec::with_capacity(2);
        if component.dragged.iter().any(|&d| d) {
            attempts.push(component.dragged.iter().map(|&d| !d).collect::<Vec<_>>());
        }
        attempts.push(all.clone());

        for (attempt, free) in attempts.iter().enumerate() {
            component.restore(values, &initial);
            match self.newton(sketch, component, free, values) {
                Ok(iterations) => {
                    let rank = component
                        .jacobian(sketch, values, &all)
                        .rank(self.config.rank_tolerance);
                    debug!(attempt, iterations, n_vars, rank, "Component solved");
                    return Ok(n_vars.saturating_sub(rank));
                }
                Err(error) => debug!(attempt, error, "Solve attempt did not converge"),
            }
        }

        Err(self.classify_failure(sketch, component, values))
    }

    /// Run Newton iterations over the `free` unknowns of a component,
    /// returning the iteration count on convergence or the final residual
    /// otherwise
    fn newton(
        &self,
        sketch: &Sketch,
        component: &Component,
        free: &[bool],
        values: &mut [f64],
    ) -> Result<usize, f64> {
        let budget = self.iteration_budget();
        let any_free = free.iter().any(|&f| f);
        let mut previous = f64::INFINITY;
        let mut stalled = 0;

        for iteration in 0..budget {
            let f = component.residuals(sketch, values);
            let error = max_abs(&f);
            if error < self.config.tolerance {
                return Ok(iteration);
            }
            if !any_free {
                return Err(error);
            }

            // An inconsistent system settles at a nonzero residual
            if error > previous * 0.999 {
                stalled += 1;
                if stalled >= 3 {
                    return Err(error);
                }
            } else {
                stalled = 0;
            }
            previous = error;

            let j = component.jacobian(sketch, values, free);
            let rhs: Vec<f64> = f.iter().map(|e| -e).collect();
            let Some(dx) = j.min_norm_solve(&rhs, REGULARIZATION) else {
                return Err(error);
            };
            if dx.iter().any(|d| !d.is_finite()) {
                return Err(error);
            }

            for (&param, d) in component.unknowns.iter().zip(&dx) {
                values[param] += self.config.damping * d;
            }
        }

        let error = max_abs(&component.residuals(sketch, values));
        if error < self.config.tolerance {
            Ok(budget)
        } else {
            Err(error)
        }
    }

    /// Tell an inconsistent component from one that ran out of iterations.
    ///
    /// The component is inconsistent when the least-squares step of the
    /// linearized system at the final iterate cannot remove the residual.
    fn classify_failure(&self, sketch: &Sketch, component: &Component, values: &[f64]) -> Failure {
        let evaluator = Evaluator::new(sketch, values);
        let mut conflicts = Vec::new();
        let mut residuals = Vec::new();
        for constraint in &component.equations {
            residuals.clear();
            evaluator.residuals(constraint, &mut residuals);
            if max_abs(&residuals) >= self.config.tolerance {
                conflicts.push(constraint.id());
            }
        }

        let f = component.residuals(sketch, values);
        let j = component.jacobian(sketch, values, &vec![true; component.unknowns.len()]);
        let rhs: Vec<f64> = f.iter().map(|e| -e).collect();
        let remaining = match j.min_norm_solve(&rhs, REGULARIZATION) {
            Some(dx) => {
                let predicted: Vec<f64> = f.iter().zip(j.mul(&dx)).map(|(a, b)| a + b).collect();
                norm(&predicted)
            }
            None => norm(&f),
        };

        Failure {
            conflicts,
            inconsistent: remaining > self.config.tolerance
                && remaining > INCONSISTENCY_RATIO * norm(&f),
        }
    }
}

/// Unsatisfied constraints of a component that did not solve
struct Failure {
    conflicts: Vec<ConstraintId>,
    inconsistent: bool,
}

/// Unknowns and equations of one group
struct System {
    /// Indices into the param table
    unknowns: Vec<usize>,
    dragged: HashSet<usize>,
    equations: Vec<SketchConstraint>,
}

impl System {
    fn build(sketch: &Sketch, group: Group) -> Self {
        let unknowns = sketch
            .params_table()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.group == group)
            .map(|(i, _)| i)
            .collect();

        let mut dragged = HashSet::new();
        let mut equations = Vec::new();
        for constraint in sketch.constraints_iter().filter(|c| c.group() == group) {
            match constraint {
                SketchConstraint::Dragged { point, .. } => {
                    collect_point_params(sketch, *point, group, &mut dragged);
                }
                _ => equations.push(constraint.clone()),
            }
        }

        Self {
            unknowns,
            dragged,
            equations,
        }
    }

    fn equation_rows(&self) -> usize {
        self.equations.iter().map(|c| c.equation_count()).sum()
    }

    /// Split into components of unknowns linked by shared equations.
    ///
    /// Unknowns no equation depends on form components of their own.
    /// Equations that depend on no unknown are gathered in one last
    /// component without unknowns.
    fn components(&self, sketch: &Sketch) -> Vec<Component> {
        let mut column = vec![None; sketch.param_count()];
        for (k, &param) in self.unknowns.iter().enumerate() {
            column[param] = Some(k);
        }

        let mut sets = UnionFind::new(self.unknowns.len());
        let mut depends = Vec::with_capacity(self.equations.len());
        for constraint in &self.equations {
            let mut params = Vec::new();
            for entity in constraint.referenced_entities() {
                entity_params(sketch, entity, &mut params);
            }
            let mut cols: Vec<usize> = params.into_iter().filter_map(|p| column[p]).collect();
            cols.sort_unstable();
            cols.dedup();
            for pair in cols.windows(2) {
                sets.union(pair[0], pair[1]);
            }
            depends.push(cols);
        }

        let mut components: Vec<Component> = Vec::new();
        let mut by_root = HashMap::new();
        // Component and local column of each unknown
        let mut owner = vec![(0, 0); self.unknowns.len()];
        for (k, &param) in self.unknowns.iter().enumerate() {
            let root = sets.find(k);
            let index = *by_root.entry(root).or_insert_with(|| {
                components.push(Component::default());
                components.len() - 1
            });
            let component = &mut components[index];
            owner[k] = (index, component.unknowns.len());
            component.unknowns.push(param);
            component.dragged.push(self.dragged.contains(&param));
            component.users.push(Vec::new());
        }

        let mut fixed = Component::default();
        for (constraint, cols) in self.equations.iter().zip(depends) {
            let component = match cols.first() {
                Some(&k) => &mut components[owner[k].0],
                None => &mut fixed,
            };
            let equation = component.equations.len();
            for &k in &cols {
                component.users[owner[k].1].push(equation);
            }
            component.offsets.push(component.rows);
            component.rows += constraint.equation_count();
            component.equations.push(constraint.clone());
        }
        if !fixed.equations.is_empty() {
            components.push(fixed);
        }
        components
    }
}

/// Unknowns and the equations coupling them
#[derive(Default)]
struct Component {
    /// Indices into the param table, in param order
    unknowns: Vec<usize>,
    /// Whether each unknown belongs to a dragged point
    dragged: Vec<bool>,
    equations: Vec<SketchConstraint>,
    /// First residual row of each equation
    offsets: Vec<usize>,
    rows: usize,
    /// Equations depending on each unknown
    users: Vec<Vec<usize>>,
}

impl Component {
    fn restore(&self, values: &mut [f64], saved: &[f64]) {
        for (&param, &value) in self.unknowns.iter().zip(saved) {
            values[param] = value;
        }
    }

    fn residuals(&self, sketch: &Sketch, values: &[f64]) -> Vec<f64> {
        evaluate(sketch, values, &self.equations)
    }

    /// Jacobian over the `free` unknowns by central differences. Only the
    /// equations depending on a perturbed unknown are re-evaluated.
    fn jacobian(&self, sketch: &Sketch, values: &[f64], free: &[bool]) -> SparseRows {
        let mut jacobian = SparseRows::new(self.rows, self.unknowns.len());
        let mut perturbed = values.to_vec();
        let mut plus = Vec::new();
        let mut minus = Vec::new();

        for (col, &param) in self.unknowns.iter().enumerate() {
            if !free[col] {
                continue;
            }
            let x = values[param];
            let h = 1e-6 * x.abs().max(1.0);

            for &equation in &self.users[col] {
                let constraint = &self.equations[equation];
                plus.clear();
                minus.clear();
                perturbed[param] = x + h;
                Evaluator::new(sketch, &perturbed).residuals(constraint, &mut plus);
                perturbed[param] = x - h;
                Evaluator::new(sketch, &perturbed).residuals(constraint, &mut minus);
                perturbed[param] = x;

                for (k, (p, m)) in plus.iter().zip(&minus).enumerate() {
                    jacobian.push(self.offsets[equation] + k, col, (p - m) / (2.0 * h));
                }
            }
        }

        jacobian
    }
}

/// Disjoint sets over unknown indices
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parent[b] = a;
        }
    }
}

/// Params of a point that belong to `group`
fn collect_point_params(
    sketch: &Sketch,
    point: EntityId,
    group: Group,
    out: &mut HashSet<usize>,
) {
    if let Some(entity @ (SketchEntity::Point3d { .. } | SketchEntity::Point2d { .. })) =
        sketch.entity(point)
        && entity.group() == group
    {
        out.extend(entity.params().iter().map(|p| p.index()));
    }
}

/// Every param the world placement of an entity depends on
fn entity_params(sketch: &Sketch, id: EntityId, out: &mut Vec<usize>) {
    match sketch.entity(id) {
        Some(SketchEntity::Point3d { params, .. }) => {
            out.extend(params.iter().map(|p| p.index()));
        }
        Some(SketchEntity::Normal3d { params, .. }) => {
            out.extend(params.iter().map(|p| p.index()));
        }
        Some(SketchEntity::Workplane { origin, normal, .. }) => {
            entity_params(sketch, *origin, out);
            entity_params(sketch, *normal, out);
        }
        Some(SketchEntity::Point2d {
            workplane, params, ..
        }) => {
            out.extend(params.iter().map(|p| p.index()));
            entity_params(sketch, *workplane, out);
        }
        None => {}
    }
}

fn evaluate(sketch: &Sketch, values: &[f64], equations: &[SketchConstraint]) -> Vec<f64> {
    let evaluator = Evaluator::new(sketch, values);
    let mut f = Vec::new();
    for constraint in equations {
        evaluator.residuals(constraint, &mut f);
    }
    f
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

fn norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{DQuat, DVec3};

    /// Sketch with a constant XY workplane at the origin
    fn xy_sketch() -> (Sketch, EntityId) {
        let mut sketch = Sketch::new();
        let origin = sketch.add_point_3d(Group::CONSTANT, DVec3::ZERO);
        let normal = sketch.add_normal_3d(Group::CONSTANT, DQuat::IDENTITY);
        let plane = sketch
            .add_workplane(Group::CONSTANT, origin, normal)
            .unwrap();
        (sketch, plane)
    }

    fn uv(sketch: &Sketch, point: EntityId) -> (f64, f64) {
        let params = sketch.params_of(point).unwrap();
        (
            sketch.param(params[0]).unwrap(),
            sketch.param(params[1]).unwrap(),
        )
    }

    #[test]
    fn test_simple_horizontal_constraint() {
        let (mut sketch, plane) = xy_sketch();
        let p1 = sketch.add_point_2d(Group::SOLVE, plane, 0.0, 0.0).unwrap();
        let p2 = sketch.add_point_2d(Group::SOLVE, plane, 10.0, 5.0).unwrap();
        sketch.horizontal(Group::SOLVE, p1, p2, plane).unwrap();

        let result = sketch.solve(Group::SOLVE, true);
        assert!(result.is_ok(), "Solver should not fail: {result:?}");

        let (_, v1) = uv(&sketch, p1);
        let (_, v2) = uv(&sketch, p2);
        assert_relative_eq!(v1, v2, epsilon = 1e-9);
        // Minimum-norm step splits the correction evenly
        assert_relative_eq!(v1, 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_satisfied_system_does_not_move() {
        let (mut sketch, plane) = xy_sketch();
        let p1 = sketch.add_point_2d(Group::SOLVE, plane, 1.0, 2.0).unwrap();
        let p2 = sketch.add_point_2d(Group::SOLVE, plane, 4.0, 2.0).unwrap();
        let free = sketch.add_point_2d(Group::SOLVE, plane, 7.0, 7.0).unwrap();
        sketch.horizontal(Group::SOLVE, p1, p2, plane).unwrap();

        let result = sketch.solve(Group::SOLVE, true);
        assert!(result.is_ok());
        assert_eq!(uv(&sketch, p1), (1.0, 2.0));
        assert_eq!(uv(&sketch, p2), (4.0, 2.0));
        assert_eq!(uv(&sketch, free), (7.0, 7.0));
    }

    #[test]
    fn test_distance_constraint() {
        let mut sketch = Sketch::new();
        let p1 = sketch.add_point_3d(Group::CONSTANT, DVec3::ZERO);
        let p2 = sketch.add_point_3d(Group::SOLVE, DVec3::new(5.0, 0.0, 0.0));
        sketch.distance(Group::SOLVE, p1, p2, 10.0, None).unwrap();

        let result = sketch.solve(Group::SOLVE, true);
        assert_eq!(result, SolveResult::UnderConstrained { dof: 2 });

        let pos2 = sketch.point_position(p2).unwrap();
        assert_relative_eq!(pos2.length(), 10.0, epsilon = 1e-9);
        // The constant point never moves
        assert_eq!(sketch.point_position(p1).unwrap(), DVec3::ZERO);
    }

    #[test]
    fn test_coincident_3d_fully_constrained() {
        let mut sketch = Sketch::new();
        let anchor = sketch.add_point_3d(Group::CONSTANT, DVec3::new(1.0, 2.0, 3.0));
        let p = sketch.add_point_3d(Group::SOLVE, DVec3::new(-4.0, 0.0, 8.0));
        sketch.coincident(Group::SOLVE, anchor, p, None).unwrap();

        let result = sketch.solve(Group::SOLVE, true);
        assert_eq!(result, SolveResult::FullyConstrained);
        assert!(
            sketch
                .point_position(p)
                .unwrap()
                .abs_diff_eq(DVec3::new(1.0, 2.0, 3.0), 1e-9)
        );
    }

    #[test]
    fn test_dragged_point_holds_its_position() {
        let (mut sketch, plane) = xy_sketch();
        let p1 = sketch.add_point_2d(Group::SOLVE, plane, 0.0, 0.0).unwrap();
        let p2 = sketch.add_point_2d(Group::SOLVE, plane, 3.0, 4.0).unwrap();
        sketch.horizontal(Group::SOLVE, p1, p2, plane).unwrap();
        sketch.dragged(Group::SOLVE, p2).unwrap();

        assert!(sketch.solve(Group::SOLVE, true).is_ok());
        assert_eq!(uv(&sketch, p2), (3.0, 4.0));
        let (_, v1) = uv(&sketch, p1);
        assert_relative_eq!(v1, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_dragged_point_released_when_pinned_system_fails() {
        let mut sketch = Sketch::new();
        let anchor = sketch.add_point_3d(Group::CONSTANT, DVec3::ZERO);
        let p = sketch.add_point_3d(Group::SOLVE, DVec3::new(2.0, 0.0, 0.0));
        sketch.coincident(Group::SOLVE, anchor, p, None).unwrap();
        sketch.dragged(Group::SOLVE, p).unwrap();

        assert!(sketch.solve(Group::SOLVE, true).is_ok());
        assert!(sketch.point_position(p).unwrap().abs_diff_eq(DVec3::ZERO, 1e-9));
    }

    #[test]
    fn test_inconsistent_system_restores_params() {
        let mut sketch = Sketch::new();
        let a = sketch.add_point_3d(Group::CONSTANT, DVec3::ZERO);
        let b = sketch.add_point_3d(Group::CONSTANT, DVec3::new(4.0, 0.0, 0.0));
        let p = sketch.add_point_3d(Group::SOLVE, DVec3::new(1.0, 1.0, 0.0));
        let c1 = sketch.coincident(Group::SOLVE, a, p, None).unwrap();
        let c2 = sketch.coincident(Group::SOLVE, b, p, None).unwrap();

        let result = sketch.solve(Group::SOLVE, true);
        match result {
            SolveResult::OverConstrained { conflicts } => {
                assert_eq!(conflicts, vec![c1, c2]);
            }
            other => panic!("expected an inconsistent result, got {other:?}"),
        }
        assert_eq!(
            sketch.point_position(p).unwrap(),
            DVec3::new(1.0, 1.0, 0.0)
        );

        // Without force_all only the first conflict is reported
        match sketch.solve(Group::SOLVE, false) {
            SolveResult::OverConstrained { conflicts } => assert_eq!(conflicts, vec![c1]),
            other => panic!("expected an inconsistent result, got {other:?}"),
        }
    }

    #[test]
    fn test_other_groups_are_ignored() {
        let (mut sketch, plane) = xy_sketch();
        let p1 = sketch.add_point_2d(Group(3), plane, 0.0, 0.0).unwrap();
        let p2 = sketch.add_point_2d(Group(3), plane, 1.0, 1.0).unwrap();
        sketch.horizontal(Group(3), p1, p2, plane).unwrap();

        assert_eq!(sketch.solve(Group::SOLVE, true), SolveResult::FullyConstrained);
        assert_eq!(uv(&sketch, p2), (1.0, 1.0));
    }

    #[test]
    fn test_unconverged_consistent_system_fails() {
        let mut sketch = Sketch::with_solver(
            ConstraintSolver::new()
                .with_max_iterations(1)
                .with_damping(0.5),
        );
        let anchor = sketch.add_point_3d(Group::CONSTANT, DVec3::ZERO);
        let p = sketch.add_point_3d(Group::SOLVE, DVec3::new(5.0, 0.0, 0.0));
        sketch.distance(Group::SOLVE, anchor, p, 10.0, None).unwrap();

        // Two half steps leave a quarter of the residual
        let result = sketch.solve(Group::SOLVE, true);
        assert!(
            matches!(result, SolveResult::Failed { .. }),
            "expected a convergence failure, got {result:?}"
        );
        assert_eq!(sketch.point_position(p).unwrap(), DVec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_low_damping_gets_a_larger_budget() {
        let solver = ConstraintSolver::new().with_damping(0.1);
        assert_eq!(solver.iteration_budget(), 500);
        assert_eq!(ConstraintSolver::new().iteration_budget(), 50);

        let (mut sketch, plane) = xy_sketch();
        sketch.set_solver(solver);
        let p1 = sketch.add_point_2d(Group::SOLVE, plane, 0.0, 0.0).unwrap();
        let p2 = sketch.add_point_2d(Group::SOLVE, plane, 10.0, 5.0).unwrap();
        sketch.horizontal(Group::SOLVE, p1, p2, plane).unwrap();

        assert!(sketch.solve(Group::SOLVE, true).is_ok());
        let (_, v1) = uv(&sketch, p1);
        let (_, v2) = uv(&sketch, p2);
        assert_relative_eq!(v1, v2, epsilon = 1e-9);
    }

    #[test]
    fn test_independent_components() {
        let (mut sketch, plane) = xy_sketch();
        let p1 = sketch.add_point_2d(Group::SOLVE, plane, 0.0, 0.0).unwrap();
        let p2 = sketch.add_point_2d(Group::SOLVE, plane, 4.0, 2.0).unwrap();
        let p3 = sketch.add_point_2d(Group::SOLVE, plane, 1.0, 1.0).unwrap();
        let p4 = sketch.add_point_2d(Group::SOLVE, plane, 1.0, 7.0).unwrap();
        sketch.add_point_2d(Group::SOLVE, plane, 9.0, 9.0).unwrap();
        sketch.horizontal(Group::SOLVE, p1, p2, plane).unwrap();
        sketch.vertical(Group::SOLVE, p3, p4, plane).unwrap();

        let components = System::build(&sketch, Group::SOLVE).components(&sketch);
        assert_eq!(components.len(), 4);
        assert_eq!(
            components.iter().filter(|c| !c.equations.is_empty()).count(),
            2
        );
        for component in &components {
            for (col, users) in component.users.iter().enumerate() {
                let param = component.unknowns[col];
                assert_eq!(users.is_empty(), component.equations.is_empty(), "param {param}");
            }
        }

        // Each pair keeps 3 of its 4 unknowns free, the loose point both
        assert_eq!(
            sketch.solve(Group::SOLVE, true),
            SolveResult::UnderConstrained { dof: 8 }
        );
        let (_, v1) = uv(&sketch, p1);
        let (_, v2) = uv(&sketch, p2);
        assert_relative_eq!(v1, v2, epsilon = 1e-9);
        assert_eq!(uv(&sketch, p3), (1.0, 1.0));
    }

    #[test]
    fn test_failing_component_keeps_every_param() {
        let (mut sketch, plane) = xy_sketch();
        let p1 = sketch.add_point_2d(Group::SOLVE, plane, 0.0, 0.0).unwrap();
        let p2 = sketch.add_point_2d(Group::SOLVE, plane, 3.0, 4.0).unwrap();
        sketch.horizontal(Group::SOLVE, p1, p2, plane).unwrap();

        let a = sketch.add_point_3d(Group::CONSTANT, DVec3::ZERO);
        let b = sketch.add_point_3d(Group::CONSTANT, DVec3::new(0.0, 6.0, 0.0));
        let p = sketch.add_point_3d(Group::SOLVE, DVec3::new(1.0, 1.0, 1.0));
        let c1 = sketch.coincident(Group::SOLVE, a, p, None).unwrap();
        let c2 = sketch.coincident(Group::SOLVE, b, p, None).unwrap();

        assert_eq!(
            sketch.solve(Group::SOLVE, true),
            SolveResult::OverConstrained {
                conflicts: vec![c1, c2]
            }
        );
        assert_eq!(uv(&sketch, p1), (0.0, 0.0));
        assert_eq!(uv(&sketch, p2), (3.0, 4.0));
        assert_eq!(
            sketch.point_position(p).unwrap(),
            DVec3::new(1.0, 1.0, 1.0)
        );
    }

    #[test]
    fn test_unsatisfied_constant_equation_is_inconsistent() {
        let mut sketch = Sketch::new();
        let a = sketch.add_point_3d(Group::CONSTANT, DVec3::ZERO);
        let b = sketch.add_point_3d(Group::CONSTANT, DVec3::X);
        let c = sketch.coincident(Group::SOLVE, a, b, None).unwrap();

        assert_eq!(
            sketch.solve(Group::SOLVE, false),
            SolveResult::OverConstrained { conflicts: vec![c] }
        );
    }

    #[test]
    fn test_builder_clamps_damping() {
        let solver = ConstraintSolver::new().with_damping(5.0);
        assert_eq!(solver.config().damping, 1.0);
        let solver = ConstraintSolver::with_config(SolverConfig {
            damping: 0.0,
            ..SolverConfig::default()
        });
        assert_eq!(solver.config().damping, 0.1);
    }
}
