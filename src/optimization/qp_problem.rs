// QP assembly for the curvature-tracking error model
//
// Variables over a horizon of N segments: z = [d_0, psi_0, ..., d_{N-1},
// psi_{N-1}, u_0, ..., u_{N-1}] where d is lateral offset, psi heading
// error and u curvature deviation from the reference. 3N variables total.

use nalgebra::{DMatrix, Matrix2, Vector2};

use crate::common::PlannerConfig;

use super::corridor::DividedSegments;

/// End-of-horizon boundary condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EndConstraint {
    /// Terminal state left free
    Free,
    /// Ending heading error held at `epsi` within `tolerance`
    Heading { epsi: f64, tolerance: f64 },
    /// Ending heading error and lateral offset held within independent
    /// tolerances; used by the sampler to aim at lateral goals
    Pose {
        epsi: f64,
        offset: f64,
        epsi_tolerance: f64,
        offset_tolerance: f64,
    },
}

impl EndConstraint {
    fn row_count(&self) -> usize {
        match self {
            EndConstraint::Free => 0,
            EndConstraint::Heading { .. } => 1,
            EndConstraint::Pose { .. } => 2,
        }
    }
}

/// Assembled QP: minimize 0.5 z'Hz subject to lower <= Az <= upper.
#[derive(Debug, Clone)]
pub struct QpProblem {
    pub hessian: DMatrix<f64>,
    pub gradient: Vec<f64>,
    pub constraints: DMatrix<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub horizon: usize,
}

impl QpProblem {
    /// Number of decision variables for a horizon of `n` segments.
    pub fn num_vars(n: usize) -> usize {
        3 * n
    }

    /// Number of constraint rows: 2 initial-state rows, 2(N-1) dynamics
    /// rows, N offset box rows, plus the end-condition rows.
    pub fn num_rows(n: usize, end: &EndConstraint) -> usize {
        2 + 2 * (n - 1) + n + end.row_count()
    }

    /// Row index of the first offset box row; the dynamic re-optimizer
    /// refreshes bounds starting here.
    pub fn offset_row_start(n: usize) -> usize {
        2 + 2 * (n - 1)
    }

    /// Per-step transition of the (offset, heading-error) pair, linearized
    /// around the local reference curvature `k` over an arc step `h`.
    pub fn dynamic_matrices(h: f64, k: f64) -> (Matrix2<f64>, Vector2<f64>) {
        let a = Matrix2::new(1.0, h, -h * k * k, 1.0);
        let b = Vector2::new(0.0, h);
        (a, b)
    }

    /// Build cost, dynamics and constraint matrices for the given corridor.
    /// `init_state` is the (cross-track error, heading error) pair at the
    /// first segment. Degenerate clearance intervals are encoded as
    /// zero-width rows rather than dropped.
    pub fn assemble(
        segments: &DividedSegments,
        init_state: [f64; 2],
        end: EndConstraint,
        config: &PlannerConfig,
    ) -> QpProblem {
        segments.assert_consistent();
        let n = segments.len();
        assert!(n >= 2, "QP assembly needs at least 2 segments, got {}", n);

        let num_vars = Self::num_vars(n);
        let num_rows = Self::num_rows(n, &end);

        // Diagonal cost over offsets, heading errors and controls.
        let mut hessian = DMatrix::zeros(num_vars, num_vars);
        for i in 0..n {
            hessian[(2 * i, 2 * i)] = config.offset_weight;
            hessian[(2 * i + 1, 2 * i + 1)] = config.heading_weight;
            hessian[(2 * n + i, 2 * n + i)] = config.control_weight;
        }
        let gradient = vec![0.0; num_vars];

        let mut constraints = DMatrix::zeros(num_rows, num_vars);
        let mut lower = vec![0.0; num_rows];
        let mut upper = vec![0.0; num_rows];

        // Initial state rows.
        constraints[(0, 0)] = 1.0;
        lower[0] = init_state[0];
        upper[0] = init_state[0];
        constraints[(1, 1)] = 1.0;
        lower[1] = init_state[1];
        upper[1] = init_state[1];

        // Dynamics rows: x_{i+1} - A_i x_i - B_i u_i = 0.
        for i in 0..n - 1 {
            let h = segments.s_list[i + 1] - segments.s_list[i];
            let k = segments.k_list[i];
            let (a, b) = Self::dynamic_matrices(h, k);
            let row = 2 + 2 * i;
            constraints[(row, 2 * (i + 1))] = 1.0;
            constraints[(row, 2 * i)] = -a[(0, 0)];
            constraints[(row, 2 * i + 1)] = -a[(0, 1)];
            constraints[(row, 2 * n + i)] = -b[0];
            constraints[(row + 1, 2 * (i + 1) + 1)] = 1.0;
            constraints[(row + 1, 2 * i)] = -a[(1, 0)];
            constraints[(row + 1, 2 * i + 1)] = -a[(1, 1)];
            constraints[(row + 1, 2 * n + i)] = -b[1];
        }

        // Offset box rows from the corridor clearance.
        let box_start = Self::offset_row_start(n);
        for i in 0..n {
            let row = box_start + i;
            constraints[(row, 2 * i)] = 1.0;
            let c = segments.clearance_list[i];
            let c = if c.is_degenerate() { c.collapse() } else { c };
            lower[row] = c.lower;
            upper[row] = c.upper;
        }

        // End-condition rows.
        let end_start = box_start + n;
        match end {
            EndConstraint::Free => {}
            EndConstraint::Heading { epsi, tolerance } => {
                constraints[(end_start, 2 * (n - 1) + 1)] = 1.0;
                lower[end_start] = epsi - tolerance;
                upper[end_start] = epsi + tolerance;
            }
            EndConstraint::Pose { epsi, offset, epsi_tolerance, offset_tolerance } => {
                constraints[(end_start, 2 * (n - 1) + 1)] = 1.0;
                lower[end_start] = epsi - epsi_tolerance;
                upper[end_start] = epsi + epsi_tolerance;
                constraints[(end_start + 1, 2 * (n - 1))] = 1.0;
                lower[end_start + 1] = offset - offset_tolerance;
                upper[end_start + 1] = offset + offset_tolerance;
            }
        }

        QpProblem { hessian, gradient, constraints, lower, upper, horizon: n }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ClearanceBound;

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
    fn test_matrix_dimensions_follow_formula() {
        let config = PlannerConfig::default();
        let seg = straight_segments(7, 0.5, 1.0);
        for end in [
            EndConstraint::Free,
            EndConstraint::Heading { epsi: 0.0, tolerance: 0.1 },
            EndConstraint::Pose {
                epsi: 0.0,
                offset: 0.5,
                epsi_tolerance: 0.1,
                offset_tolerance: 0.2,
            },
        ] {
            let qp = QpProblem::assemble(&seg, [0.0, 0.0], end, &config);
            let n = seg.len();
            assert_eq!(qp.hessian.nrows(), QpProblem::num_vars(n));
            assert_eq!(qp.hessian.ncols(), QpProblem::num_vars(n));
            assert_eq!(qp.constraints.nrows(), QpProblem::num_rows(n, &end));
            assert_eq!(qp.constraints.ncols(), QpProblem::num_vars(n));
            assert_eq!(qp.lower.len(), qp.constraints.nrows());
            assert_eq!(qp.upper.len(), qp.constraints.nrows());
            assert_eq!(qp.gradient.len(), QpProblem::num_vars(n));
        }
    }

    #[test]
    fn test_dynamic_matrices_shape() {
        let (a, b) = QpProblem::dynamic_matrices(0.5, 0.1);
        assert!((a[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((a[(0, 1)] - 0.5).abs() < 1e-12);
        assert!((a[(1, 0)] + 0.5 * 0.01).abs() < 1e-12);
        assert!((a[(1, 1)] - 1.0).abs() < 1e-12);
        assert!((b[0] - 0.0).abs() < 1e-12);
        assert!((b[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_init_state_rows() {
        let config = PlannerConfig::default();
        let seg = straight_segments(5, 0.5, 1.0);
        let qp = QpProblem::assemble(&seg, [0.3, -0.1], EndConstraint::Free, &config);
        assert_eq!(qp.lower[0], 0.3);
        assert_eq!(qp.upper[0], 0.3);
        assert_eq!(qp.lower[1], -0.1);
        assert_eq!(qp.upper[1], -0.1);
    }

    #[test]
    fn test_degenerate_clearance_encoded_zero_width() {
        let config = PlannerConfig::default();
        let mut seg = straight_segments(5, 0.5, 1.0);
        seg.clearance_list[3] = ClearanceBound::new(0.4, -0.2);
        let qp = QpProblem::assemble(&seg, [0.0, 0.0], EndConstraint::Free, &config);
        let row = QpProblem::offset_row_start(5) + 3;
        assert_eq!(qp.lower[row], qp.upper[row]);
        assert!((qp.lower[row] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_dynamics_rows_reference_local_step() {
        let config = PlannerConfig::default();
        let mut seg = straight_segments(4, 0.5, 1.0);
        // Make the last interval irregular.
        *seg.s_list.last_mut().unwrap() = 1.3;
        let qp = QpProblem::assemble(&seg, [0.0, 0.0], EndConstraint::Free, &config);
        // Offset row of the last dynamics pair uses h = 0.3.
        let row = 2 + 2 * 2;
        assert!((qp.constraints[(row, 2 * 2 + 1)] + 0.3).abs() < 1e-12);
    }

    #[test]
    #[should_panic]
    fn test_single_segment_horizon_is_contract_violation() {
        let config = PlannerConfig::default();
        let seg = straight_segments(1, 0.5, 1.0);
        let _ = QpProblem::assemble(&seg, [0.0, 0.0], EndConstraint::Free, &config);
    }
}
