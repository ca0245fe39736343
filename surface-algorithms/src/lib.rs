//! # Surface Algorithms
//!
//! Point cloud stages that run ahead of Poisson reconstruction: neighbour
//! search, normal estimation and orientation, and Poisson-disk subsampling.
//!
//! The numerics come from `rstar` (R*-tree neighbour queries) and `nalgebra`
//! (symmetric eigen-decomposition); these modules only wire them together.

pub mod nearest_neighbor;
pub mod normals;
pub mod sampling;

// Re-export commonly used items
pub use nearest_neighbor::*;
pub use normals::*;
pub use sampling::*;
