//! I/O operations for point clouds and meshes
//!
//! Reading and writing is delegated to `ply-rs`; this crate only maps PLY
//! elements onto the workspace types and picks a reader from the extension.

pub mod ply;

use std::path::Path;
use surface_core::{Error, Point3f, PointCloud, Result, TriangleMesh, Vector3f};

/// Trait for reading point clouds from files
pub trait PointCloudReader {
    fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>>;
}

/// Trait for writing point clouds to files
pub trait PointCloudWriter {
    fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<Point3f>, path: P) -> Result<()>;
}

/// Trait for reading meshes from files
pub trait MeshReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh>;
}

/// Trait for writing meshes to files
pub trait MeshWriter {
    fn write_mesh<P: AsRef<Path>>(
        mesh: &TriangleMesh,
        path: P,
        options: &MeshWriteOptions,
    ) -> Result<()>;
}

/// Which vertex attributes and which encoding a mesh is written with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshWriteOptions {
    pub binary: bool,
    pub write_vertex_normals: bool,
    pub write_vertex_colors: bool,
}

impl Default for MeshWriteOptions {
    fn default() -> Self {
        Self {
            binary: true,
            write_vertex_normals: true,
            write_vertex_colors: true,
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
}

/// Auto-detect format and read point cloud
pub fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>> {
    let (cloud, _) = read_point_cloud_with_normals(path)?;
    Ok(cloud)
}

/// Auto-detect format and read a point cloud, keeping stored normals if present
pub fn read_point_cloud_with_normals<P: AsRef<Path>>(
    path: P,
) -> Result<(PointCloud<Point3f>, Option<Vec<Vector3f>>)> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => {
            let (cloud, normals) = ply::PlyReader::read_point_cloud_with_normals(path)?;
            log::debug!("Read {} points from {}", cloud.len(), path.display());
            Ok((cloud, normals))
        }
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported point cloud format: {:?}",
            path.extension()
        ))),
    }
}

/// Auto-detect format and write a point cloud
pub fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<Point3f>, path: P) -> Result<()> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => ply::PlyWriter::write_point_cloud(cloud, path),
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported point cloud format: {:?}",
            path.extension()
        ))),
    }
}

/// Auto-detect format and read mesh
pub fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => ply::PlyReader::read_mesh(path),
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported mesh format: {:?}",
            path.extension()
        ))),
    }
}

/// Auto-detect format and write a triangle mesh
pub fn write_triangle_mesh<P: AsRef<Path>>(
    mesh: &TriangleMesh,
    path: P,
    options: &MeshWriteOptions,
) -> Result<()> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => {
            ply::PlyWriter::write_mesh(mesh, path, options)?;
            log::info!(
                "Saved {} vertices / {} faces to {}",
                mesh.vertex_count(),
                mesh.face_count(),
                path.display()
            );
            Ok(())
        }
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported mesh format: {:?}",
            path.extension()
        ))),
    }
}
