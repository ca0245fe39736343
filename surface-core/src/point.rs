//! Point types and related functionality

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A point with normal vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalPoint3f {
    pub position: Point3f,
    pub normal: Vector3f,
}

impl NormalPoint3f {
    pub fn new(position: Point3f, normal: Vector3f) -> Self {
        Self { position, normal }
    }

    /// A point whose normal is the zero vector, i.e. not estimated yet
    pub fn unoriented(position: Point3f) -> Self {
        Self {
            position,
            normal: Vector3f::zeros(),
        }
    }

    /// Whether the normal is usable as a Poisson sample (non-zero and finite)
    pub fn has_valid_normal(&self) -> bool {
        let magnitude = self.normal.magnitude();
        magnitude.is_finite() && magnitude > 1e-6
    }
}

impl Default for NormalPoint3f {
    fn default() -> Self {
        Self {
            position: Point3f::origin(),
            normal: Vector3f::new(0.0, 0.0, 1.0),
        }
    }
}

impl From<NormalPoint3f> for Point3f {
    fn from(point: NormalPoint3f) -> Self {
        point.position
    }
}
