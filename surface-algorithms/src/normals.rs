//! Normal estimation and orientation

use crate::nearest_neighbor::NeighborIndex;
use nalgebra::{Matrix3, Vector3};
use priority_queue::PriorityQueue;
use rayon::prelude::*;
use std::cmp::Ordering;
use surface_core::{Error, Point3f, Result, Vector3f};

/// Parameters for PCA normal estimation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalEstimation {
    /// Neighbourhood size, the query point included
    pub k: usize,
    /// Accumulate the covariance in f32 instead of f64
    pub fast: bool,
}

impl Default for NormalEstimation {
    fn default() -> Self {
        Self { k: 30, fast: true }
    }
}

/// Estimate one unit normal per point from the covariance of its k nearest neighbours.
///
/// The sign of each normal is arbitrary; orient them afterwards with
/// [`orient_normals_consistent_tangent_plane`] or one of the viewpoint/direction helpers.
/// Points whose neighbourhood is degenerate get `+Z`.
pub fn estimate_normals(points: &[Point3f], params: &NormalEstimation) -> Result<Vec<Vector3f>> {
    if points.len() < 3 {
        return Err(Error::InvalidData(format!(
            "Normal estimation needs at least 3 points, got {}",
            points.len()
        )));
    }
    if params.k < 3 {
        return Err(Error::InvalidData(format!(
            "Normal estimation needs k >= 3, got {}",
            params.k
        )));
    }

    let index = NeighborIndex::new(points);
    let normals = points
        .par_iter()
        .map(|p| {
            let neighbors: Vec<Point3f> = index
                .k_nearest(p, params.k)
                .into_iter()
                .map(|(i, _)| points[i])
                .collect();
            let normal = if params.fast {
                plane_normal_f32(&neighbors)
            } else {
                plane_normal_f64(&neighbors)
            };
            normal.unwrap_or_else(Vector3f::z)
        })
        .collect();

    Ok(normals)
}

fn plane_normal_f32(neighbors: &[Point3f]) -> Option<Vector3f> {
    if neighbors.len() < 3 {
        return None;
    }
    let count = neighbors.len() as f32;
    let centroid = neighbors.iter().fold(Vector3f::zeros(), |acc, p| acc + p.coords) / count;
    let covariance = neighbors.iter().fold(Matrix3::<f32>::zeros(), |acc, p| {
        let d = p.coords - centroid;
        acc + d * d.transpose()
    }) / count;

    smallest_eigenvector(covariance)
}

fn plane_normal_f64(neighbors: &[Point3f]) -> Option<Vector3f> {
    if neighbors.len() < 3 {
        return None;
    }
    let count = neighbors.len() as f64;
    let coords: Vec<Vector3<f64>> = neighbors.iter().map(|p| p.coords.cast::<f64>()).collect();
    let centroid = coords.iter().fold(Vector3::<f64>::zeros(), |acc, c| acc + c) / count;
    let covariance = coords.iter().fold(Matrix3::<f64>::zeros(), |acc, c| {
        let d = c - centroid;
        acc + d * d.transpose()
    }) / count;

    smallest_eigenvector(covariance).map(|n| n.cast::<f32>())
}

fn smallest_eigenvector<T: nalgebra::RealField + Copy>(covariance: Matrix3<T>) -> Option<Vector3<T>> {
    let eigen = covariance.symmetric_eigen();
    let normal = eigen.eigenvectors.column(eigen.eigenvalues.imin()).into_owned();
    let magnitude = normal.norm();
    if magnitude > T::default_epsilon() {
        Some(normal / magnitude)
    } else {
        None
    }
}

/// Flip normals so each one points towards `viewpoint`
pub fn orient_normals_towards_viewpoint(
    points: &[Point3f],
    normals: &mut [Vector3f],
    viewpoint: &Point3f,
) {
    for (point, normal) in points.iter().zip(normals.iter_mut()) {
        if normal.dot(&(viewpoint - point)) < 0.0 {
            *normal = -*normal;
        }
    }
}

/// Flip normals so each one has a non-negative component along `direction`
pub fn orient_normals_to_align_with_direction(normals: &mut [Vector3f], direction: &Vector3f) {
    for normal in normals.iter_mut() {
        if normal.dot(direction) < 0.0 {
            *normal = -*normal;
        }
    }
}

/// Rescale every non-zero normal to unit length
pub fn normalize_normals(normals: &mut [Vector3f]) {
    for normal in normals.iter_mut() {
        let magnitude = normal.magnitude();
        if magnitude > f32::EPSILON {
            *normal /= magnitude;
        }
    }
}

/// |cos| between two normals; larger pops first from the Prim frontier
#[derive(Debug, Clone, Copy)]
struct Parallelism(f32);

impl PartialEq for Parallelism {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}
impl Eq for Parallelism {}

impl PartialOrd for Parallelism {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Parallelism {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Symmetric k-NN adjacency lists
fn riemannian_graph(points: &[Point3f], k: usize) -> Vec<Vec<usize>> {
    let index = NeighborIndex::new(points);
    let mut adjacency: Vec<Vec<usize>> = points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            index
                .k_nearest(p, k + 1)
                .into_iter()
                .map(|(j, _)| j)
                .filter(|&j| j != i)
                .collect()
        })
        .collect();

    for i in 0..adjacency.len() {
        for n in 0..adjacency[i].len() {
            let j = adjacency[i][n];
            if !adjacency[j].contains(&i) {
                adjacency[j].push(i);
            }
        }
    }
    adjacency
}

/// Make normal signs agree across the surface.
///
/// Builds the k-NN graph, weights each edge by `1 - |n_i . n_j|` and propagates the
/// orientation along a minimum spanning tree (Prim). Each connected component is
/// seeded at its highest point, whose normal is turned towards `+Z`.
pub fn orient_normals_consistent_tangent_plane(
    points: &[Point3f],
    normals: &mut [Vector3f],
    k: usize,
) -> Result<()> {
    if points.len() != normals.len() {
        return Err(Error::InvalidData(format!(
            "{} points but {} normals",
            points.len(),
            normals.len()
        )));
    }
    if k == 0 {
        return Err(Error::InvalidData("Orientation needs k >= 1".to_string()));
    }
    if points.is_empty() {
        return Ok(());
    }

    let adjacency = riemannian_graph(points, k);

    let mut seeds: Vec<usize> = (0..points.len()).collect();
    seeds.sort_by(|&a, &b| points[b].z.total_cmp(&points[a].z));

    let mut visited = vec![false; points.len()];
    let mut parent = vec![usize::MAX; points.len()];
    let mut components = 0usize;

    for seed in seeds {
        if visited[seed] {
            continue;
        }
        components += 1;
        if normals[seed].z < 0.0 {
            normals[seed] = -normals[seed];
        }

        let mut frontier = PriorityQueue::new();
        frontier.push(seed, Parallelism(f32::INFINITY));

        while let Some((current, _)) = frontier.pop() {
            visited[current] = true;
            let from = parent[current];
            if from != usize::MAX && normals[current].dot(&normals[from]) < 0.0 {
                normals[current] = -normals[current];
            }

            for &next in &adjacency[current] {
                if visited[next] {
                    continue;
                }
                let weight = Parallelism(normals[current].dot(&normals[next]).abs());
                let better = frontier
                    .get_priority(&next)
                    .map_or(true, |existing| weight > *existing);
                if better {
                    frontier.push(next, weight);
                    parent[next] = current;
                }
            }
        }
    }

    log::debug!(
        "Oriented {} normals across {} component(s)",
        normals.len(),
        components
    );
    Ok(())
}

/// Average each normal with its sign-aligned neighbours, `iterations` times
pub fn smooth_normals(
    points: &[Point3f],
    normals: &mut [Vector3f],
    k: usize,
    iterations: usize,
) -> Result<()> {
    if points.len() != normals.len() {
        return Err(Error::InvalidData(format!(
            "{} points but {} normals",
            points.len(),
            normals.len()
        )));
    }
    if iterations == 0 || points.is_empty() {
        return Ok(());
    }

    let index = NeighborIndex::new(points);
    let neighborhoods: Vec<Vec<usize>> = points
        .par_iter()
        .map(|p| index.k_nearest(p, k.max(1)).into_iter().map(|(j, _)| j).collect())
        .collect();

    for _ in 0..iterations {
        let smoothed: Vec<Vector3f> = neighborhoods
            .par_iter()
            .enumerate()
            .map(|(i, neighbors)| {
                let reference = normals[i];
                let sum = neighbors.iter().fold(Vector3f::zeros(), |acc, &j| {
                    let n = normals[j];
                    if n.dot(&reference) < 0.0 {
                        acc - n
                    } else {
                        acc + n
                    }
                });
                let magnitude = sum.magnitude();
                if magnitude > f32::EPSILON {
                    sum / magnitude
                } else {
                    reference
                }
            })
            .collect();
        normals.copy_from_slice(&smoothed);
    }
    Ok(())
}
