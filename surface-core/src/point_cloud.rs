//! Point cloud data structures and functionality

use crate::point::*;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// A generic point cloud container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloud<T> {
    pub points: Vec<T>,
}

/// A point cloud with 3D points
pub type PointCloud3f = PointCloud<Point3f>;

/// A point cloud with normal vectors
pub type NormalPointCloud3f = PointCloud<NormalPoint3f>;

impl<T> PointCloud<T> {
    /// Create a new empty point cloud
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Create a point cloud from a vector of points
    pub fn from_points(points: Vec<T>) -> Self {
        Self { points }
    }

    /// Get the number of points in the cloud
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add a point to the cloud
    pub fn push(&mut self, point: T) {
        self.points.push(point);
    }

    /// Get an iterator over the points
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.points.iter()
    }

    /// Get a mutable iterator over the points
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.points.iter_mut()
    }

    /// Clear all points from the cloud
    pub fn clear(&mut self) {
        self.points.clear();
    }
}

impl PointCloud<NormalPoint3f> {
    /// Build an unoriented cloud (zero normals) from bare positions
    pub fn from_positions(positions: &[Point3f]) -> Self {
        positions.iter().copied().map(NormalPoint3f::unoriented).collect()
    }

    /// Positions of every point, in order
    pub fn positions(&self) -> Vec<Point3f> {
        self.points.iter().map(|p| p.position).collect()
    }

    /// Normals of every point, in order
    pub fn normals(&self) -> Vec<Vector3f> {
        self.points.iter().map(|p| p.normal).collect()
    }

    /// Overwrite the normals. The slice must match the point count.
    pub fn set_normals(&mut self, normals: &[Vector3f]) {
        for (point, normal) in self.points.iter_mut().zip(normals) {
            point.normal = *normal;
        }
    }

    /// True when at least one point carries a non-zero normal
    pub fn has_normals(&self) -> bool {
        self.points.iter().any(NormalPoint3f::has_valid_normal)
    }
}

impl<T> Default for PointCloud<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for PointCloud<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<T> IndexMut<usize> for PointCloud<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.points[index]
    }
}

impl<T> IntoIterator for PointCloud<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PointCloud<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl<T> FromIterator<T> for PointCloud<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            points: Vec::from_iter(iter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_positions_starts_without_normals() {
        let cloud = PointCloud::from_positions(&[
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
        ]);
        assert_eq!(cloud.len(), 2);
        assert!(!cloud.has_normals());
    }

    #[test]
    fn test_set_normals() {
        let mut cloud = PointCloud::from_positions(&[Point3f::origin(); 3]);
        cloud.set_normals(&[Vector3f::z(); 3]);
        assert!(cloud.has_normals());
        assert_eq!(cloud.normals()[2], Vector3f::z());
    }
}
