// QP based path optimizer
//
// Orchestrates corridor construction, QP assembly and solving, and decodes
// the optimal (offset, heading-error) trajectory back into Cartesian space.
// Also hosts the candidate sampling layer and the warm-started dynamic
// re-optimization entry point.

use itertools::izip;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

use crate::common::{
    normalize_angle, CarGeometry, ClearanceBound, FreeSpace, PlannerConfig, PlannerError,
    PlannerResult, State,
};
use crate::cubic_spline::Spline2D;

use super::corridor::{CorridorBuilder, DividedSegments};
use super::qp_problem::{EndConstraint, QpProblem};
use super::solver::{solve_qp, DynamicSolver, QpSolution};

/// Result of one (longitudinal, lateral) sampling trial.
#[derive(Debug, Clone)]
pub enum SampleOutcome {
    Accepted { path: Vec<State>, mean_offset: f64 },
    Rejected { reason: String },
}

/// One sampling trial, kept in trial order for diagnostics.
#[derive(Debug, Clone)]
pub struct SampledPath {
    pub lon: f64,
    pub lat: f64,
    pub outcome: SampleOutcome,
}

/// Decoded output of the dynamic re-optimizer.
#[derive(Debug, Clone)]
pub struct DynamicTrajectory {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub s: Vec<f64>,
}

/// Reference geometry captured when the persistent dynamic solver is
/// initialized; re-solves decode against it.
#[derive(Debug, Clone, Default)]
struct DynamicGeometry {
    x: Vec<f64>,
    y: Vec<f64>,
    angle: Vec<f64>,
    s: Vec<f64>,
}

/// Converts a rough point sequence into a smooth, collision-free path by
/// solving a convex QP over a discretized corridor around the smoothed
/// reference curve.
pub struct PathOptimizer<'a, F: FreeSpace> {
    map: &'a F,
    config: PlannerConfig,
    car: CarGeometry,
    end_state: State,
    spline: Spline2D,
    /// Cross-track error of the start state against the smoothed path
    cte: f64,
    /// Heading error of the start state against the smoothed path
    epsi: f64,
    densify_result: bool,
    dynamic_solver: DynamicSolver,
    dynamic_geometry: DynamicGeometry,
    // Visualization buffers, refreshed as a byproduct of the public calls.
    smoothed_path: Vec<State>,
    left_bound: Vec<State>,
    right_bound: Vec<State>,
    rear_bounds: Vec<State>,
    center_bounds: Vec<State>,
    front_bounds: Vec<State>,
    sample_outcomes: Vec<SampledPath>,
    best_sampling_index: Option<usize>,
}

impl<'a, F: FreeSpace> PathOptimizer<'a, F> {
    /// Fit the smoothed reference curve through `points` and set up the
    /// optimizer. `densify_path` resamples the output to a finer uniform
    /// spacing before it is returned.
    pub fn new(
        points: &[State],
        start_state: State,
        end_state: State,
        map: &'a F,
        densify_path: bool,
    ) -> PlannerResult<Self> {
        Self::with_config(
            points,
            start_state,
            end_state,
            map,
            densify_path,
            PlannerConfig::default(),
            CarGeometry::default(),
        )
    }

    pub fn with_config(
        points: &[State],
        start_state: State,
        end_state: State,
        map: &'a F,
        densify_path: bool,
        config: PlannerConfig,
        car: CarGeometry,
    ) -> PlannerResult<Self> {
        if points.len() < 2 {
            return Err(PlannerError::InvalidParameter(format!(
                "need at least 2 points to smooth, got {}",
                points.len()
            )));
        }
        let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
        let spline = Spline2D::new(&xs, &ys)?;

        let (cte, epsi) = Self::start_errors(&spline, &start_state, config.probe_step);
        let smoothed_path = Self::sample_curve(&spline, config.output_spacing);

        Ok(PathOptimizer {
            map,
            config,
            car,
            end_state,
            spline,
            cte,
            epsi,
            densify_result: densify_path,
            dynamic_solver: DynamicSolver::new(),
            dynamic_geometry: DynamicGeometry::default(),
            smoothed_path,
            left_bound: Vec::new(),
            right_bound: Vec::new(),
            rear_bounds: Vec::new(),
            center_bounds: Vec::new(),
            front_bounds: Vec::new(),
            sample_outcomes: Vec::new(),
            best_sampling_index: None,
        })
    }

    /// Project the start state onto the curve: signed lateral offset and
    /// heading error at the nearest curve point.
    fn start_errors(spline: &Spline2D, start: &State, scan_step: f64) -> (f64, f64) {
        let length = spline.total_length();
        let mut best_s = 0.0;
        let mut best_d2 = f64::INFINITY;
        let mut s = 0.0;
        while s <= length {
            let (px, py) = spline.calc_position(s);
            let d2 = (start.x - px).powi(2) + (start.y - py).powi(2);
            if d2 < best_d2 {
                best_d2 = d2;
                best_s = s;
            }
            s += scan_step;
        }
        let (px, py) = spline.calc_position(best_s);
        let yaw = spline.calc_yaw(best_s);
        let cte = (start.y - py) * yaw.cos() - (start.x - px) * yaw.sin();
        let epsi = normalize_angle(start.yaw - yaw);
        (cte, epsi)
    }

    fn sample_curve(spline: &Spline2D, spacing: f64) -> Vec<State> {
        let length = spline.total_length();
        let mut out = Vec::new();
        let mut s = 0.0;
        while s <= length {
            let (x, y) = spline.calc_position(s);
            let mut state = State::new(x, y, spline.calc_yaw(s));
            state.k = spline.calc_curvature(s);
            state.s = s;
            out.push(state);
            s += spacing;
        }
        out
    }

    /// Optimize the full horizon and return the final path.
    pub fn solve(&mut self) -> PlannerResult<Vec<State>> {
        let horizon = self.spline.total_length();
        let mut builder = CorridorBuilder::new(&self.spline, self.map, &self.config, &self.car);
        let segments = builder.build(horizon, true)?;
        self.rear_bounds = std::mem::take(&mut builder.rear_bounds);
        self.center_bounds = std::mem::take(&mut builder.center_bounds);
        self.front_bounds = std::mem::take(&mut builder.front_bounds);
        self.store_bound_buffers(&segments);

        if let Some(i) = segments.degenerate_index() {
            return Err(PlannerError::DegenerateCorridor(format!(
                "clearance collapsed at segment {} (s = {:.2})",
                i, segments.s_list[i]
            )));
        }

        let end = if self.config.constrain_end_heading {
            let end_epsi =
                normalize_angle(self.end_state.yaw - *segments.angle_list.last().unwrap());
            EndConstraint::Heading {
                epsi: end_epsi,
                tolerance: self.config.end_heading_tolerance,
            }
        } else {
            EndConstraint::Free
        };

        let qp = QpProblem::assemble(&segments, [self.cte, self.epsi], end, &self.config);
        let solution = solve_qp(&qp, &self.config)?;
        let path = self.decode(
            &segments.x_list,
            &segments.y_list,
            &segments.angle_list,
            &segments.s_list,
            &solution,
        );
        if self.densify_result {
            Ok(self.densify(path))
        } else {
            Ok(path)
        }
    }

    /// Sample candidate paths over a grid of longitudinal extents and
    /// lateral targets. Trials run in the row-major order of the given
    /// sets; failed trials are retained in `sample_outcomes`.
    pub fn sample_paths(
        &mut self,
        lon_set: &[f64],
        lat_set: &[f64],
    ) -> PlannerResult<Vec<Vec<State>>> {
        if lon_set.is_empty() || lat_set.is_empty() {
            return Err(PlannerError::InvalidParameter(
                "empty longitudinal or lateral sampling set".to_string(),
            ));
        }
        let max_s = self.spline.total_length();
        let mut builder = CorridorBuilder::new(&self.spline, self.map, &self.config, &self.car);
        let base = builder.build(max_s, false)?;

        self.sample_outcomes.clear();
        self.best_sampling_index = None;
        self.store_bound_buffers(&base);

        for &lon in lon_set {
            let max_lon_mode = lon >= max_s - self.config.delta_s;
            let segments = if max_lon_mode {
                base.clone()
            } else {
                let target_index = (lon / self.config.delta_s).floor() as usize + 1;
                base.copy_prefix(target_index.min(base.len()))
            };
            for &lat in lat_set {
                let outcome = self.sample_single(&segments, lat);
                self.sample_outcomes.push(SampledPath { lon, lat, outcome });
            }
        }

        self.best_sampling_index = self
            .sample_outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, trial)| match &trial.outcome {
                SampleOutcome::Accepted { mean_offset, .. } => {
                    Some((i, trial.lon, *mean_offset))
                }
                SampleOutcome::Rejected { .. } => None,
            })
            .min_by_key(|&(_, lon, mean)| (Reverse(OrderedFloat(lon)), OrderedFloat(mean)))
            .map(|(i, _, _)| i);

        let paths: Vec<Vec<State>> = self
            .sample_outcomes
            .iter()
            .filter_map(|trial| match &trial.outcome {
                SampleOutcome::Accepted { path, .. } => Some(path.clone()),
                SampleOutcome::Rejected { .. } => None,
            })
            .collect();
        if paths.is_empty() {
            return Err(PlannerError::InfeasibleProblem(
                "no feasible sampled path".to_string(),
            ));
        }
        Ok(paths)
    }

    fn sample_single(&self, segments: &DividedSegments, lat: f64) -> SampleOutcome {
        if segments.len() < 2 {
            return SampleOutcome::Rejected {
                reason: "horizon shorter than one step".to_string(),
            };
        }
        if let Some(i) = segments.degenerate_index() {
            return SampleOutcome::Rejected {
                reason: format!("degenerate corridor at segment {}", i),
            };
        }
        let end = EndConstraint::Pose {
            epsi: 0.0,
            offset: lat,
            epsi_tolerance: self.config.sampling_heading_tolerance,
            offset_tolerance: self.config.sampling_offset_tolerance,
        };
        let qp = QpProblem::assemble(segments, [self.cte, self.epsi], end, &self.config);
        match solve_qp(&qp, &self.config) {
            Ok(solution) => {
                let mean_offset = solution.offsets.iter().map(|d| d.abs()).sum::<f64>()
                    / solution.offsets.len() as f64;
                let path = self.decode(
                    &segments.x_list,
                    &segments.y_list,
                    &segments.angle_list,
                    &segments.s_list,
                    &solution,
                );
                SampleOutcome::Accepted { path, mean_offset }
            }
            Err(e) => SampleOutcome::Rejected { reason: format!("{}", e) },
        }
    }

    /// Re-optimize around moving obstacles. The first call (or a call after
    /// a failure or a horizon change) assembles the full QP from geometry
    /// sampled at `s_list` and initializes the persistent solver; later
    /// calls refresh only the bounds and re-solve warm-started.
    pub fn optimize_dynamic(
        &mut self,
        s_list: &[f64],
        clearance_list: &[ClearanceBound],
    ) -> PlannerResult<DynamicTrajectory> {
        if s_list.len() != clearance_list.len() {
            return Err(PlannerError::InvalidParameter(format!(
                "{} arc-length samples but {} clearance entries",
                s_list.len(),
                clearance_list.len()
            )));
        }
        if s_list.len() < 2 {
            return Err(PlannerError::MalformedHorizon(
                "dynamic horizon needs at least 2 samples".to_string(),
            ));
        }
        if s_list.windows(2).any(|w| w[1] <= w[0]) {
            return Err(PlannerError::MalformedHorizon(
                "arc-length samples must be strictly increasing".to_string(),
            ));
        }

        if !self.dynamic_solver.is_warm(s_list.len()) {
            let segments = self.segments_from_spline(s_list, clearance_list);
            self.dynamic_geometry = DynamicGeometry {
                x: segments.x_list.clone(),
                y: segments.y_list.clone(),
                angle: segments.angle_list.clone(),
                s: segments.s_list.clone(),
            };
            let qp = QpProblem::assemble(
                &segments,
                [self.cte, self.epsi],
                EndConstraint::Free,
                &self.config,
            );
            self.dynamic_solver.initialize(&qp, &self.config)?;
        }

        let solution = self.dynamic_solver.solve_with_bounds(clearance_list)?;
        let geometry = &self.dynamic_geometry;
        let mut x = Vec::with_capacity(geometry.x.len());
        let mut y = Vec::with_capacity(geometry.y.len());
        for (&rx, &ry, &angle, &d) in
            izip!(&geometry.x, &geometry.y, &geometry.angle, &solution.offsets)
        {
            x.push(rx - d * angle.sin());
            y.push(ry + d * angle.cos());
        }
        Ok(DynamicTrajectory { x, y, s: geometry.s.clone() })
    }

    fn segments_from_spline(
        &self,
        s_list: &[f64],
        clearance_list: &[ClearanceBound],
    ) -> DividedSegments {
        let mut segments = DividedSegments::default();
        for (&s, &c) in s_list.iter().zip(clearance_list.iter()) {
            let (x, y) = self.spline.calc_position(s);
            segments.s_list.push(s);
            segments.k_list.push(self.spline.calc_curvature(s));
            segments.x_list.push(x);
            segments.y_list.push(y);
            segments.angle_list.push(self.spline.calc_yaw(s));
            segments.clearance_list.push(c);
        }
        segments.assert_consistent();
        segments
    }

    fn decode(
        &self,
        ref_x: &[f64],
        ref_y: &[f64],
        ref_angle: &[f64],
        ref_s: &[f64],
        solution: &QpSolution,
    ) -> Vec<State> {
        let mut path = Vec::with_capacity(ref_x.len());
        for (&rx, &ry, &angle, &s, &d, &psi) in izip!(
            ref_x,
            ref_y,
            ref_angle,
            ref_s,
            &solution.offsets,
            &solution.headings
        ) {
            let mut state = State::new(
                rx - d * angle.sin(),
                ry + d * angle.cos(),
                normalize_angle(angle + psi),
            );
            state.s = s;
            path.push(state);
        }
        // Curvature from heading differences along the decoded path.
        for i in 0..path.len().saturating_sub(1) {
            let ds = path[i].distance(&path[i + 1]);
            if ds > 1e-9 {
                path[i].k = normalize_angle(path[i + 1].yaw - path[i].yaw) / ds;
            }
        }
        if path.len() >= 2 {
            let last_k = path[path.len() - 2].k;
            path.last_mut().unwrap().k = last_k;
        }
        path
    }

    /// Resample the decoded path at the configured output spacing.
    fn densify(&self, path: Vec<State>) -> Vec<State> {
        if path.len() < 2 {
            return path;
        }
        let xs: Vec<f64> = path.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = path.iter().map(|p| p.y).collect();
        match Spline2D::new(&xs, &ys) {
            Ok(spline) => Self::sample_curve(&spline, self.config.output_spacing),
            // Duplicate decoded points: fall back to the raw path.
            Err(_) => path,
        }
    }

    fn store_bound_buffers(&mut self, segments: &DividedSegments) {
        self.left_bound.clear();
        self.right_bound.clear();
        for (&x, &y, &angle, c) in izip!(
            &segments.x_list,
            &segments.y_list,
            &segments.angle_list,
            &segments.clearance_list
        ) {
            self.left_bound
                .push(State::new(x - c.upper * angle.sin(), y + c.upper * angle.cos(), angle));
            self.right_bound
                .push(State::new(x - c.lower * angle.sin(), y + c.lower * angle.cos(), angle));
        }
    }

    // Read-only visualization accessors.

    pub fn smoothed_path(&self) -> &[State] {
        &self.smoothed_path
    }

    pub fn left_bound(&self) -> &[State] {
        &self.left_bound
    }

    pub fn right_bound(&self) -> &[State] {
        &self.right_bound
    }

    pub fn rear_bounds(&self) -> &[State] {
        &self.rear_bounds
    }

    pub fn center_bounds(&self) -> &[State] {
        &self.center_bounds
    }

    pub fn front_bounds(&self) -> &[State] {
        &self.front_bounds
    }

    pub fn sample_outcomes(&self) -> &[SampledPath] {
        &self.sample_outcomes
    }

    pub fn best_sampling_index(&self) -> Option<usize> {
        self.best_sampling_index
    }

    pub fn initial_errors(&self) -> (f64, f64) {
        (self.cte, self.epsi)
    }
}
