//! Core data structures and traits for surface reconstruction
//!
//! This crate provides the shared types every reconstruction backend works on:
//! points, point clouds, triangle meshes, the neighbour-search and bounding-box
//! traits, and the error type used across the workspace.

pub mod point;
pub mod point_cloud;
pub mod mesh;
pub mod traits;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use mesh::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3};
