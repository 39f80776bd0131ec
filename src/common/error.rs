//! Error types for path_optimizer

use std::fmt;

/// Main error type for the path optimization pipeline
#[derive(Debug)]
pub enum PlannerError {
    /// Invalid input parameter (empty point list, bad step size, etc.)
    InvalidParameter(String),
    /// Zero-length or otherwise unusable optimization horizon
    MalformedHorizon(String),
    /// A corridor segment's clearance bounds crossed or collapsed
    DegenerateCorridor(String),
    /// The QP solver reported the problem infeasible
    InfeasibleProblem(String),
    /// Numerical computation failed (matrix inversion, solver setup, etc.)
    NumericalError(String),
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannerError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            PlannerError::MalformedHorizon(msg) => write!(f, "Malformed horizon: {}", msg),
            PlannerError::DegenerateCorridor(msg) => write!(f, "Degenerate corridor: {}", msg),
            PlannerError::InfeasibleProblem(msg) => write!(f, "Infeasible problem: {}", msg),
            PlannerError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
        }
    }
}

impl std::error::Error for PlannerError {}

/// Result type alias for path optimization operations
pub type PlannerResult<T> = Result<T, PlannerError>;
