// Path optimization pipeline: corridor construction, QP assembly,
// solving, sampling and dynamic re-optimization.

pub mod corridor;
pub mod path_optimizer;
pub mod qp_problem;
pub mod solver;

pub use corridor::*;
pub use path_optimizer::*;
pub use qp_problem::*;
pub use solver::*;
