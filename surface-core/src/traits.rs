//! Core traits for surface reconstruction

use crate::{mesh::*, point::*, point_cloud::*};

/// Trait for nearest neighbor search functionality
pub trait NearestNeighborSearch {
    /// Find the k nearest neighbors to a query point
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)>;

    /// Find all neighbors within a given radius
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)>;
}

/// Trait for objects with a spatial extent
pub trait Drawable {
    /// Get the bounding box of the object
    fn bounding_box(&self) -> (Point3f, Point3f);

    /// Get the center point of the object
    fn center(&self) -> Point3f {
        let (min, max) = self.bounding_box();
        nalgebra::center(&min, &max)
    }

    /// Length of the bounding box diagonal
    fn diagonal(&self) -> f32 {
        let (min, max) = self.bounding_box();
        (max - min).magnitude()
    }
}

/// Axis-aligned bounds of a set of positions
pub fn bounds_of<'a>(positions: impl IntoIterator<Item = &'a Point3f>) -> (Point3f, Point3f) {
    let mut iter = positions.into_iter();
    let Some(first) = iter.next() else {
        return (Point3f::origin(), Point3f::origin());
    };

    let mut min = *first;
    let mut max = *first;
    for p in iter {
        min = min.inf(p);
        max = max.sup(p);
    }
    (min, max)
}

impl Drawable for PointCloud<Point3f> {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        bounds_of(&self.points)
    }
}

impl Drawable for PointCloud<NormalPoint3f> {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        bounds_of(self.points.iter().map(|p| &p.position))
    }
}

impl Drawable for TriangleMesh {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        bounds_of(&self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounding_box_and_diagonal() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(-1.0, 0.0, 2.0),
            Point3f::new(1.0, 2.0, 0.0),
            Point3f::new(0.0, 1.0, 1.0),
        ]);
        let (min, max) = cloud.bounding_box();
        assert_eq!(min, Point3f::new(-1.0, 0.0, 0.0));
        assert_eq!(max, Point3f::new(1.0, 2.0, 2.0));
        assert_eq!(cloud.center(), Point3f::new(0.0, 1.0, 1.0));
        assert_relative_eq!(cloud.diagonal(), 12.0_f32.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_empty_bounds_are_origin() {
        let cloud = PointCloud::<Point3f>::new();
        assert_eq!(cloud.bounding_box(), (Point3f::origin(), Point3f::origin()));
    }
}
