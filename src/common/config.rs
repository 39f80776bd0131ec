//! Planner configuration and vehicle geometry

/// Configuration for the QP path optimizer
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Arc-length step between corridor segments [m]
    pub delta_s: f64,
    /// Spacing of the densified output path [m]
    pub output_spacing: f64,
    /// Cost weight on lateral offset
    pub offset_weight: f64,
    /// Cost weight on heading error
    pub heading_weight: f64,
    /// Cost weight on control effort (curvature deviation)
    pub control_weight: f64,
    /// Lateral probing cap per side [m]
    pub max_clearance: f64,
    /// Step of the lateral clearance probe [m]
    pub probe_step: f64,
    /// Margin subtracted from each side in 4-circle probing [m]
    pub safety_margin: f64,
    /// Constrain the ending heading error to the stored end state
    pub constrain_end_heading: bool,
    /// Allowed ending heading-error deviation in `solve` [rad]
    pub end_heading_tolerance: f64,
    /// Allowed terminal offset deviation for sampled paths [m]
    pub sampling_offset_tolerance: f64,
    /// Allowed terminal heading-error deviation for sampled paths [rad]
    pub sampling_heading_tolerance: f64,
    /// Maximum QP solver iterations
    pub solver_max_iter: usize,
    /// QP solver absolute tolerance
    pub solver_eps_abs: f64,
    /// QP solver relative tolerance
    pub solver_eps_rel: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            delta_s: 0.5,
            output_spacing: 0.2,
            offset_weight: 1.0,
            heading_weight: 10.0,
            control_weight: 100.0,
            max_clearance: 10.0,
            probe_step: 0.1,
            safety_margin: 0.2,
            constrain_end_heading: true,
            end_heading_tolerance: 0.05,
            sampling_offset_tolerance: 0.3,
            sampling_heading_tolerance: 0.2,
            solver_max_iter: 20000,
            solver_eps_abs: 1e-6,
            solver_eps_rel: 1e-6,
        }
    }
}

/// Vehicle geometry for footprint clearance checks
#[derive(Debug, Clone)]
pub struct CarGeometry {
    /// Distance between front and rear axles [m]
    pub wheel_base: f64,
    /// Distance from the rear axle to the geometric center [m]
    pub rear_axle_to_center: f64,
    /// Overall width [m]
    pub width: f64,
    /// Radius of the footprint covering circles [m]
    pub circle_radius: f64,
    /// Tangential offsets of the covering circles from the rear axle [m],
    /// rear to front
    pub circle_offsets: [f64; 4],
}

impl Default for CarGeometry {
    fn default() -> Self {
        Self {
            wheel_base: 2.85,
            rear_axle_to_center: 1.45,
            width: 2.0,
            circle_radius: 1.2,
            circle_offsets: [-0.5, 1.0, 2.5, 4.0],
        }
    }
}
