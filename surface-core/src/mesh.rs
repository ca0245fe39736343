//! Mesh data structures and functionality

use crate::point::*;
use crate::point_cloud::PointCloud;
use serde::{Deserialize, Serialize};

/// A triangle mesh with vertices and faces
///
/// A mesh without faces is a valid value: it is how a point-cloud layer is
/// represented before reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            colors: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            colors: None,
        }
    }

    /// Create a face-less mesh from an oriented point cloud
    pub fn from_point_cloud(cloud: &PointCloud<NormalPoint3f>) -> Self {
        let mut mesh = Self::from_vertices_and_faces(cloud.positions(), Vec::new());
        if cloud.has_normals() {
            mesh.normals = Some(cloud.normals());
        }
        mesh
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Vertices paired with their normals (zero when the mesh has none)
    pub fn to_point_cloud(&self) -> PointCloud<NormalPoint3f> {
        self.vertices
            .iter()
            .enumerate()
            .map(|(i, position)| {
                let normal = self
                    .normals
                    .as_ref()
                    .and_then(|normals| normals.get(i).copied())
                    .unwrap_or_else(Vector3f::zeros);
                NormalPoint3f::new(*position, normal)
            })
            .collect()
    }

    /// Area-weighted vertex normals accumulated from the faces
    pub fn compute_vertex_normals(&mut self) {
        let mut normals = vec![Vector3f::zeros(); self.vertices.len()];
        for face in &self.faces {
            let v0 = self.vertices[face[0]];
            let edge1 = self.vertices[face[1]] - v0;
            let edge2 = self.vertices[face[2]] - v0;
            let weighted = edge1.cross(&edge2);
            for &index in face {
                normals[index] += weighted;
            }
        }
        for normal in &mut normals {
            let magnitude = normal.magnitude();
            if magnitude > f32::EPSILON {
                *normal /= magnitude;
            }
        }
        self.normals = Some(normals);
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}
