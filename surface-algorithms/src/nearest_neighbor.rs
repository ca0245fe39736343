//! Nearest neighbor search backed by an rstar R*-tree

use rstar::{primitives::GeomWithData, RTree};
use surface_core::{NearestNeighborSearch, Point3f};

type IndexedPosition = GeomWithData<[f64; 3], usize>;

/// Bulk-loaded R*-tree over a fixed set of positions; items are indices into that set.
///
/// Any number of points may share a coordinate on an axis (flat scans, regular grids,
/// exact duplicates).
pub struct NeighborIndex {
    tree: RTree<IndexedPosition>,
}

fn key(point: &Point3f) -> [f64; 3] {
    [point.x as f64, point.y as f64, point.z as f64]
}

impl NeighborIndex {
    /// Build an index over `points`
    pub fn new(points: &[Point3f]) -> Self {
        let items = points
            .iter()
            .enumerate()
            .map(|(i, point)| GeomWithData::new(key(point), i))
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// The `k` nearest indices (the query point itself included when indexed),
    /// closest first, with euclidean distances
    pub fn k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&key(query))
            .take(k)
            .map(|(item, distance_2)| (item.data, distance_2.sqrt() as f32))
            .collect()
    }

    /// Every index strictly within `radius` of `query`, closest first
    pub fn within_radius(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        let radius = radius as f64;
        let max_distance_2 = radius * radius;
        self.tree
            .nearest_neighbor_iter_with_distance_2(&key(query))
            .take_while(|(_, distance_2)| *distance_2 < max_distance_2)
            .map(|(item, distance_2)| (item.data, distance_2.sqrt() as f32))
            .collect()
    }
}

impl NearestNeighborSearch for NeighborIndex {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        self.k_nearest(query, k)
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        self.within_radius(query, radius)
    }
}
