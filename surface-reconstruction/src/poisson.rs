//! Screened Poisson reconstruction through the external `poisson_reconstruction` crate

use rayon::prelude::*;
use surface_core::{Error, NormalPoint3f, Point3f, PointCloud, Result, TriangleMesh};

/// Below this many samples the octree solve is not stable
pub const MIN_POISSON_POINTS: usize = 10;

/// Engine-level configuration, independent of any backend's parameter names
#[derive(Debug, Clone, PartialEq)]
pub struct PoissonConfig {
    /// Maximum depth of the octree (default: 8)
    pub depth: usize,
    /// Depth used to estimate the sample density; clamped to `depth` (default: 5)
    pub density_estimation_depth: usize,
    /// Weight of the point interpolation (screening) term (default: 4.0)
    pub screening: f64,
    /// Gauss-Seidel relaxations per level (default: 8)
    pub relaxation_iters: usize,
    /// Dedicated worker count; `None` uses the global rayon pool
    pub threads: Option<usize>,
}

impl Default for PoissonConfig {
    fn default() -> Self {
        Self {
            depth: 8,
            density_estimation_depth: 5,
            screening: 4.0,
            relaxation_iters: 8,
            threads: None,
        }
    }
}

/// Reconstruct a watertight surface from an oriented point cloud.
///
/// Normals are renormalized; a point with a zero or non-finite normal is an error.
/// The result carries area-weighted vertex normals.
pub fn screened_poisson(
    cloud: &PointCloud<NormalPoint3f>,
    config: &PoissonConfig,
) -> Result<TriangleMesh> {
    if cloud.is_empty() {
        return Err(Error::InvalidData("Point cloud is empty".to_string()));
    }
    if cloud.len() < MIN_POISSON_POINTS {
        return Err(Error::InvalidData(format!(
            "Point cloud too small for Poisson reconstruction (minimum {} points)",
            MIN_POISSON_POINTS
        )));
    }
    if config.depth == 0 {
        return Err(Error::InvalidData("Poisson depth must be at least 1".to_string()));
    }

    match config.threads {
        Some(threads) if threads > 0 => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("poisson-{}", i))
                .build()
                .map_err(|e| Error::Algorithm(format!("Failed to build thread pool: {}", e)))?;
            pool.install(|| reconstruct(cloud, config))
        }
        _ => reconstruct(cloud, config),
    }
}

fn reconstruct(cloud: &PointCloud<NormalPoint3f>, config: &PoissonConfig) -> Result<TriangleMesh> {
    let points: Vec<nalgebra::Point3<f64>> = cloud
        .points
        .par_iter()
        .map(|p| p.position.cast::<f64>())
        .collect();

    let normals = cloud
        .points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let normal = p.normal.cast::<f64>();
            let magnitude = normal.magnitude();
            if !magnitude.is_finite() || magnitude < 1e-6 {
                return Err(Error::InvalidData(format!(
                    "Invalid normal at point {}: magnitude {}",
                    i, magnitude
                )));
            }
            Ok(normal / magnitude)
        })
        .collect::<Result<Vec<nalgebra::Vector3<f64>>>>()?;

    let density_depth = config.density_estimation_depth.clamp(1, config.depth);
    log::debug!(
        "Poisson: {} samples, depth {}, density depth {}, screening {}, {} relaxations",
        points.len(),
        config.depth,
        density_depth,
        config.screening,
        config.relaxation_iters
    );

    let poisson = poisson_reconstruction::PoissonReconstruction::from_points_and_normals(
        &points,
        &normals,
        config.screening,
        density_depth,
        config.depth,
        config.relaxation_iters,
    );

    let mesh_buffers = poisson.reconstruct_mesh_buffers();

    if mesh_buffers.vertices().is_empty() {
        return Err(Error::Algorithm(
            "Poisson reconstruction generated no vertices".to_string(),
        ));
    }

    let vertices: Vec<Point3f> = mesh_buffers
        .vertices()
        .par_iter()
        .map(|v| v.cast::<f32>())
        .collect();

    let indices = mesh_buffers.indices();
    if indices.len() % 3 != 0 {
        return Err(Error::Algorithm(
            "Invalid triangle indices from Poisson reconstruction".to_string(),
        ));
    }

    let faces: Vec<[usize; 3]> = indices
        .chunks_exact(3)
        .map(|chunk| [chunk[0] as usize, chunk[1] as usize, chunk[2] as usize])
        .collect();

    if faces.is_empty() {
        return Err(Error::Algorithm(
            "Poisson reconstruction generated no triangles".to_string(),
        ));
    }

    let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
    mesh.compute_vertex_normals();
    Ok(mesh)
}
