//! Utility modules for path_optimizer

pub mod grid_map;

pub use grid_map::*;
