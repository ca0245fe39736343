//! PLY format support

use crate::{MeshReader, MeshWriteOptions, MeshWriter, PointCloudReader, PointCloudWriter};
use ply_rs::{
    parser::Parser,
    ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    },
    writer::Writer,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use surface_core::{Error, Point3f, PointCloud, Result, TriangleMesh, Vector3f};

pub struct PlyReader;
pub struct PlyWriter;

impl PlyReader {
    fn read_ply(path: &Path) -> Result<Ply<DefaultElement>> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let parser = Parser::<DefaultElement>::new();
        Ok(parser.read_ply(&mut reader)?)
    }

    /// Read vertex positions plus `nx`/`ny`/`nz` when every vertex carries them
    pub fn read_point_cloud_with_normals(
        path: &Path,
    ) -> Result<(PointCloud<Point3f>, Option<Vec<Vector3f>>)> {
        let ply = Self::read_ply(path)?;
        let vertices = ply.payload.get("vertex").map(Vec::as_slice).unwrap_or_default();

        let points = extract_positions(vertices)?;
        let normals = extract_normals(vertices);
        Ok((PointCloud::from_points(points), normals))
    }
}

impl PointCloudReader for PlyReader {
    fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>> {
        let (cloud, _) = Self::read_point_cloud_with_normals(path.as_ref())?;
        Ok(cloud)
    }
}

impl MeshReader for PlyReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let ply = Self::read_ply(path.as_ref())?;
        let vertex_elements = ply.payload.get("vertex").map(Vec::as_slice).unwrap_or_default();

        let vertices = extract_positions(vertex_elements)?;

        let mut faces = Vec::new();
        if let Some(face_element) = ply.payload.get("face") {
            for face in face_element {
                let indices = extract_face_indices(face)?;
                if indices.len() >= 3 {
                    faces.push([indices[0], indices[1], indices[2]]);
                }
            }
        }

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        if let Some(normals) = extract_normals(vertex_elements) {
            mesh.set_normals(normals);
        }

        Ok(mesh)
    }
}

impl PointCloudWriter for PlyWriter {
    fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<Point3f>, path: P) -> Result<()> {
        let mesh = TriangleMesh::from_vertices_and_faces(cloud.points.clone(), Vec::new());
        let options = MeshWriteOptions {
            binary: false,
            write_vertex_normals: false,
            write_vertex_colors: false,
        };
        Self::write_mesh(&mesh, path, &options)
    }
}

impl MeshWriter for PlyWriter {
    fn write_mesh<P: AsRef<Path>>(
        mesh: &TriangleMesh,
        path: P,
        options: &MeshWriteOptions,
    ) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let mut ply = Ply::<DefaultElement>::new();
        ply.header.encoding = if options.binary {
            Encoding::BinaryLittleEndian
        } else {
            Encoding::Ascii
        };

        let normals = mesh.normals.as_ref().filter(|_| options.write_vertex_normals);
        let colors = mesh.colors.as_ref().filter(|_| options.write_vertex_colors);

        let mut vertex_element = ElementDef::new("vertex".to_string());
        vertex_element.count = mesh.vertices.len();
        for name in ["x", "y", "z"] {
            vertex_element.properties.add(scalar_property(name, ScalarType::Float));
        }
        if normals.is_some() {
            for name in ["nx", "ny", "nz"] {
                vertex_element.properties.add(scalar_property(name, ScalarType::Float));
            }
        }
        if colors.is_some() {
            for name in ["red", "green", "blue"] {
                vertex_element.properties.add(scalar_property(name, ScalarType::UChar));
            }
        }
        ply.header.elements.add(vertex_element.clone());

        // Always emitted so readers can tell a face-less layer from a missing element
        let mut face_element = ElementDef::new("face".to_string());
        face_element.count = mesh.faces.len();
        face_element.properties.add(PropertyDef::new(
            "vertex_indices".to_string(),
            PropertyType::List(ScalarType::UChar, ScalarType::Int),
        ));
        ply.header.elements.add(face_element);

        let mut vertices = Vec::with_capacity(mesh.vertices.len());
        for (i, vertex) in mesh.vertices.iter().enumerate() {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Float(vertex.x));
            element.insert("y".to_string(), Property::Float(vertex.y));
            element.insert("z".to_string(), Property::Float(vertex.z));

            if let Some(normals) = normals {
                let n = normals.get(i).copied().unwrap_or_else(Vector3f::zeros);
                element.insert("nx".to_string(), Property::Float(n.x));
                element.insert("ny".to_string(), Property::Float(n.y));
                element.insert("nz".to_string(), Property::Float(n.z));
            }
            if let Some(colors) = colors {
                let [r, g, b] = colors.get(i).copied().unwrap_or([255, 255, 255]);
                element.insert("red".to_string(), Property::UChar(r));
                element.insert("green".to_string(), Property::UChar(g));
                element.insert("blue".to_string(), Property::UChar(b));
            }

            vertices.push(element);
        }

        let faces = mesh
            .faces
            .iter()
            .map(|face| {
                let mut indices = [0i32; 3];
                for (slot, &idx) in indices.iter_mut().zip(face) {
                    *slot = i32::try_from(idx).map_err(|_| {
                        Error::InvalidData(format!("Face index {} does not fit a PLY int", idx))
                    })?;
                }
                Ok(indices)
            })
            .collect::<Result<Vec<[i32; 3]>>>()?;

        let writer_instance = Writer::new();
        if options.binary {
            // ply-rs writes the element count as every binary list length, so faces
            // are encoded here after its header and vertex payload
            writer_instance.write_header(&mut writer, &ply.header)?;
            writer_instance.write_payload_of_element(
                &mut writer,
                &vertices,
                &vertex_element,
                &ply.header,
            )?;
            write_binary_faces(&mut writer, &faces)?;
        } else {
            ply.payload.insert("vertex".to_string(), vertices);
            let face_elements = faces
                .iter()
                .map(|indices| {
                    let mut element = DefaultElement::new();
                    element.insert("vertex_indices".to_string(), Property::ListInt(indices.to_vec()));
                    element
                })
                .collect();
            ply.payload.insert("face".to_string(), face_elements);
            writer_instance.write_ply(&mut writer, &mut ply)?;
        }
        writer.flush()?;

        Ok(())
    }
}

/// Little-endian `face` records: a `uchar` count of 3 followed by three `int` indices
fn write_binary_faces<W: Write>(out: &mut W, faces: &[[i32; 3]]) -> Result<()> {
    for face in faces {
        out.write_all(&[3u8])?;
        for index in face {
            out.write_all(&index.to_le_bytes())?;
        }
    }
    Ok(())
}

fn scalar_property(name: &str, scalar: ScalarType) -> PropertyDef {
    PropertyDef::new(name.to_string(), PropertyType::Scalar(scalar))
}

fn extract_positions(vertices: &[DefaultElement]) -> Result<Vec<Point3f>> {
    vertices
        .iter()
        .map(|vertex| {
            Ok(Point3f::new(
                extract_property_value(vertex, "x")?,
                extract_property_value(vertex, "y")?,
                extract_property_value(vertex, "z")?,
            ))
        })
        .collect()
}

fn extract_normals(vertices: &[DefaultElement]) -> Option<Vec<Vector3f>> {
    if vertices.is_empty() {
        return None;
    }
    vertices
        .iter()
        .map(|vertex| {
            match (
                extract_property_value(vertex, "nx"),
                extract_property_value(vertex, "ny"),
                extract_property_value(vertex, "nz"),
            ) {
                (Ok(nx), Ok(ny), Ok(nz)) => Some(Vector3f::new(nx, ny, nz)),
                _ => None,
            }
        })
        .collect()
}

/// Extract a property value as f32 from a PLY element
fn extract_property_value(element: &DefaultElement, name: &str) -> Result<f32> {
    match element.get(name) {
        Some(Property::Float(val)) => Ok(*val),
        Some(Property::Double(val)) => Ok(*val as f32),
        Some(Property::Int(val)) => Ok(*val as f32),
        Some(Property::UInt(val)) => Ok(*val as f32),
        Some(Property::Short(val)) => Ok(*val as f32),
        Some(Property::UShort(val)) => Ok(*val as f32),
        _ => Err(Error::InvalidData(format!(
            "Property '{}' not found or invalid type",
            name
        ))),
    }
}

/// Extract face indices from a PLY face element
fn extract_face_indices(element: &DefaultElement) -> Result<Vec<usize>> {
    match element.get("vertex_indices").or_else(|| element.get("vertex_index")) {
        Some(Property::ListInt(indices)) => Ok(indices.iter().map(|&idx| idx as usize).collect()),
        Some(Property::ListUInt(indices)) => Ok(indices.iter().map(|&idx| idx as usize).collect()),
        _ => Err(Error::InvalidData("Face indices not found".to_string())),
    }
}
