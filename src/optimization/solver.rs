// OSQP solver adapter
//
// Converts assembled dense matrices to the solver's sparse format, runs
// one-shot solves, and owns the persistent warm-started instance used for
// dynamic re-optimization.

use std::borrow::Cow;

use nalgebra::DMatrix;
use osqp::{CscMatrix, Problem, Settings, Status};

use crate::common::{ClearanceBound, PlannerConfig, PlannerError, PlannerResult};

use super::qp_problem::QpProblem;

/// Column-compressed copy of a dense matrix.
pub fn to_csc(matrix: &DMatrix<f64>) -> CscMatrix<'static> {
    csc_filtered(matrix, |_, _| true)
}

/// Column-compressed copy of the upper triangle, as the solver expects for
/// the Hessian.
pub fn to_csc_upper(matrix: &DMatrix<f64>) -> CscMatrix<'static> {
    csc_filtered(matrix, |row, col| row <= col)
}

fn csc_filtered<P: Fn(usize, usize) -> bool>(matrix: &DMatrix<f64>, keep: P) -> CscMatrix<'static> {
    let nrows = matrix.nrows();
    let ncols = matrix.ncols();
    let mut indptr = Vec::with_capacity(ncols + 1);
    let mut indices = Vec::new();
    let mut data = Vec::new();
    indptr.push(0);
    for col in 0..ncols {
        for row in 0..nrows {
            let v = matrix[(row, col)];
            if v != 0.0 && keep(row, col) {
                indices.push(row);
                data.push(v);
            }
        }
        indptr.push(indices.len());
    }
    CscMatrix {
        nrows,
        ncols,
        indptr: Cow::Owned(indptr),
        indices: Cow::Owned(indices),
        data: Cow::Owned(data),
    }
}

fn settings(config: &PlannerConfig) -> Settings {
    Settings::default()
        .verbose(false)
        .max_iter(config.solver_max_iter as u32)
        .eps_abs(config.solver_eps_abs)
        .eps_rel(config.solver_eps_rel)
}

fn setup(qp: &QpProblem, config: &PlannerConfig) -> PlannerResult<Problem> {
    Problem::new(
        to_csc_upper(&qp.hessian),
        &qp.gradient,
        to_csc(&qp.constraints),
        &qp.lower,
        &qp.upper,
        &settings(config),
    )
    .map_err(|e| PlannerError::NumericalError(format!("solver setup failed: {:?}", e)))
}

fn extract(status: Status<'_>) -> PlannerResult<Vec<f64>> {
    match status {
        Status::Solved(solution) | Status::SolvedInaccurate(solution) => {
            Ok(solution.x().to_vec())
        }
        _ => Err(PlannerError::InfeasibleProblem(
            "QP solver did not find a feasible solution".to_string(),
        )),
    }
}

/// Decoded per-step optimum of a horizon QP.
#[derive(Debug, Clone)]
pub struct QpSolution {
    pub offsets: Vec<f64>,
    pub headings: Vec<f64>,
}

impl QpSolution {
    fn from_primal(z: &[f64], horizon: usize) -> Self {
        let offsets = (0..horizon).map(|i| z[2 * i]).collect();
        let headings = (0..horizon).map(|i| z[2 * i + 1]).collect();
        QpSolution { offsets, headings }
    }
}

/// Solve an assembled QP once and decode the state trajectory.
pub fn solve_qp(qp: &QpProblem, config: &PlannerConfig) -> PlannerResult<QpSolution> {
    let mut problem = setup(qp, config)?;
    let z = extract(problem.solve())?;
    Ok(QpSolution::from_primal(&z, qp.horizon))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WarmState {
    Uninitialized,
    Warm,
    Stale,
}

/// Persistent solver instance for dynamic re-optimization.
///
/// Lifecycle: `Uninitialized` until the first successful `initialize`;
/// `Warm` while consecutive solves succeed (bound refreshes reuse the
/// solver workspace); `Stale` after a failed solve, which forces the next
/// caller to re-initialize from fresh matrices. Single writer: all
/// mutation goes through `&mut self`.
pub struct DynamicSolver {
    problem: Option<Problem>,
    state: WarmState,
    horizon: usize,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl DynamicSolver {
    pub fn new() -> Self {
        DynamicSolver {
            problem: None,
            state: WarmState::Uninitialized,
            horizon: 0,
            lower: Vec::new(),
            upper: Vec::new(),
        }
    }

    /// Whether the instance can warm-start a re-solve for this horizon.
    pub fn is_warm(&self, horizon: usize) -> bool {
        self.state == WarmState::Warm && self.horizon == horizon && self.problem.is_some()
    }

    /// Build the full QP structure once. Also primes the stored bound
    /// vectors that later refreshes patch in place.
    pub fn initialize(&mut self, qp: &QpProblem, config: &PlannerConfig) -> PlannerResult<()> {
        let problem = setup(qp, config)?;
        self.problem = Some(problem);
        self.state = WarmState::Warm;
        self.horizon = qp.horizon;
        self.lower = qp.lower.clone();
        self.upper = qp.upper.clone();
        Ok(())
    }

    /// Refresh only the offset box rows from the supplied clearance and
    /// re-solve warm-started. On failure the instance degrades to `Stale`.
    pub fn solve_with_bounds(
        &mut self,
        clearance: &[ClearanceBound],
    ) -> PlannerResult<QpSolution> {
        let problem = self.problem.as_mut().ok_or_else(|| {
            PlannerError::InvalidParameter("dynamic solver not initialized".to_string())
        })?;
        assert_eq!(
            clearance.len(),
            self.horizon,
            "clearance count does not match solver horizon"
        );

        let box_start = QpProblem::offset_row_start(self.horizon);
        for (i, c) in clearance.iter().enumerate() {
            let c = if c.is_degenerate() { c.collapse() } else { *c };
            self.lower[box_start + i] = c.lower;
            self.upper[box_start + i] = c.upper;
        }
        problem.update_bounds(&self.lower, &self.upper);

        match extract(problem.solve()) {
            Ok(z) => {
                self.state = WarmState::Warm;
                Ok(QpSolution::from_primal(&z, self.horizon))
            }
            Err(e) => {
                self.state = WarmState::Stale;
                Err(e)
            }
        }
    }
}

impl Default for DynamicSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ClearanceBound;
    use crate::optimization::corridor::DividedSegments;
    use crate::optimization::qp_problem::EndConstraint;

    fn straight_segments(n: usize, step: f64, bound: f64) -> DividedSegments {
        let mut seg = DividedSegments::default();
        for i in 0..n {
            let s = i as f64 * step;
            seg.s_list.push(s);
            seg.k_list.push(0.0);
            seg.x_list.push(s);
            seg.y_list.push(0.0);
            seg.angle_list.push(0.0);
            seg.clearance_list.push(ClearanceBound::new(-bound, bound));
        }
        seg
    }

    #[test]
    fn test_to_csc_dense_roundtrip() {
        let m = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 2.0, 3.0, 0.0]);
        let csc = to_csc(&m);
        assert_eq!(csc.nrows, 3);
        assert_eq!(csc.ncols, 2);
        assert_eq!(csc.indptr.as_ref(), &[0usize, 2, 3][..]);
        assert_eq!(csc.indices.as_ref(), &[0usize, 2, 1][..]);
        assert_eq!(csc.data.as_ref(), &[1.0, 3.0, 2.0][..]);
    }

    #[test]
    fn test_to_csc_upper_drops_lower_triangle() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 2.0]);
        let csc = to_csc_upper(&m);
        assert_eq!(csc.indptr.as_ref(), &[0usize, 1, 3][..]);
        assert_eq!(csc.indices.as_ref(), &[0usize, 0, 1][..]);
        assert_eq!(csc.data.as_ref(), &[4.0, 1.0, 2.0][..]);
    }

    #[test]
    fn test_solve_straight_corridor_stays_centered() {
        let config = PlannerConfig::default();
        let seg = straight_segments(20, 0.5, 1.0);
        let qp = QpProblem::assemble(&seg, [0.0, 0.0], EndConstraint::Free, &config);
        let sol = solve_qp(&qp, &config).unwrap();
        for d in &sol.offsets {
            assert!(d.abs() < 1e-3, "offset {}", d);
        }
    }

    #[test]
    fn test_tightened_symmetric_corridor_keeps_zero() {
        let config = PlannerConfig::default();
        let mut seg = straight_segments(21, 0.5, 1.0);
        for i in 5..=10 {
            seg.clearance_list[i] = ClearanceBound::new(-0.1, 0.1);
        }
        let qp = QpProblem::assemble(&seg, [0.0, 0.0], EndConstraint::Free, &config);
        let sol = solve_qp(&qp, &config).unwrap();
        // The centerline is still feasible, so the optimum stays on it.
        for (i, d) in sol.offsets.iter().enumerate() {
            assert!(d.abs() < 1e-3, "offset {} at step {}", d, i);
            assert!(seg.clearance_list[i].contains(*d, 1e-3));
        }
    }

    #[test]
    fn test_solve_infeasible_bounds() {
        let config = PlannerConfig::default();
        let mut seg = straight_segments(10, 0.5, 1.0);
        // The first box row contradicts the pinned initial offset.
        seg.clearance_list[0] = ClearanceBound::new(5.0, 5.5);
        let qp = QpProblem::assemble(&seg, [0.0, 0.0], EndConstraint::Free, &config);
        assert!(matches!(
            solve_qp(&qp, &config),
            Err(PlannerError::InfeasibleProblem(_))
        ));
    }

    #[test]
    fn test_dynamic_solver_state_machine() {
        let config = PlannerConfig::default();
        let seg = straight_segments(10, 0.5, 1.0);
        let qp = QpProblem::assemble(&seg, [0.0, 0.0], EndConstraint::Free, &config);

        let mut solver = DynamicSolver::new();
        assert!(!solver.is_warm(10));
        solver.initialize(&qp, &config).unwrap();
        assert!(solver.is_warm(10));
        assert!(!solver.is_warm(12));

        let relaxed = vec![ClearanceBound::new(-1.0, 1.0); 10];
        let sol = solver.solve_with_bounds(&relaxed).unwrap();
        assert!(sol.offsets.iter().all(|d| d.abs() < 1e-3));
        assert!(solver.is_warm(10));

        // Bounds contradicting the pinned initial offset leave the
        // instance stale.
        let mut impossible = vec![ClearanceBound::new(-1.0, 1.0); 10];
        impossible[0] = ClearanceBound::new(5.0, 5.5);
        assert!(solver.solve_with_bounds(&impossible).is_err());
        assert!(!solver.is_warm(10));
    }

    #[test]
    fn test_warm_start_matches_cold_solve() {
        let config = PlannerConfig::default();
        let seg = straight_segments(20, 0.5, 2.0);
        let qp = QpProblem::assemble(&seg, [0.2, 0.0], EndConstraint::Free, &config);

        let mut solver = DynamicSolver::new();
        solver.initialize(&qp, &config).unwrap();
        let wide = vec![ClearanceBound::new(-2.0, 2.0); 20];
        solver.solve_with_bounds(&wide).unwrap();

        // Pinch the corridor and re-solve warm.
        let mut pinched = wide.clone();
        for i in 8..12 {
            pinched[i] = ClearanceBound::new(0.3, 2.0);
        }
        let warm = solver.solve_with_bounds(&pinched).unwrap();

        // Cold solve of the identical problem.
        let mut seg_cold = seg.clone();
        seg_cold.clearance_list = pinched.clone();
        let qp_cold = QpProblem::assemble(&seg_cold, [0.2, 0.0], EndConstraint::Free, &config);
        let cold = solve_qp(&qp_cold, &config).unwrap();

        for (i, (a, b)) in warm.offsets.iter().zip(cold.offsets.iter()).enumerate() {
            assert!((a - b).abs() < 1e-3, "warm {} vs cold {}", a, b);
            assert!(pinched[i].contains(*a, 1e-3), "offset {} outside bounds at {}", a, i);
        }
    }
}
