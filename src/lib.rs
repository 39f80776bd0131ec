//! path_optimizer - QP based path optimization for ground vehicles
//!
//! This crate turns a rough, possibly collision-prone point sequence into a
//! smooth, kinematically feasible, collision-free trajectory. A smoothed
//! reference curve is divided into a drivable corridor, a quadratic program
//! over lateral offset and heading error is assembled and solved per
//! horizon, and the optimum is decoded back into Cartesian space. Candidate
//! sampling over longitudinal/lateral grids and warm-started dynamic
//! re-optimization build on the same pipeline.

// Core modules
pub mod common;
pub mod utils;

// Pipeline modules
pub mod cubic_spline;
pub mod optimization;

// Re-export common types for convenience
pub use common::{CarGeometry, ClearanceBound, PlannerConfig, State};
pub use common::{FreeSpace, ReferenceCurve};
pub use common::{PlannerError, PlannerResult};
pub use cubic_spline::Spline2D;
pub use optimization::{
    CorridorBuilder, DividedSegments, DynamicSolver, DynamicTrajectory, EndConstraint,
    PathOptimizer, QpProblem, SampleOutcome, SampledPath,
};
pub use utils::GridMap;
