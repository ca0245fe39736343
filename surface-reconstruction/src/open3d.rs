//! Open3D-style backend
//!
//! Stages are named after Open3D's point cloud methods and take Open3D's keyword
//! arguments: normals are estimated and oriented on the cloud, then
//! `create_from_point_cloud_poisson` runs as `surface_reconstruction_screened_poisson`.

use crate::parameters::{decode_stage, spec, FilterParameters, KeyValues, ParameterSchema, PoissonParams};
use crate::poisson::{screened_poisson, PoissonConfig};
use crate::strategy::{SurfaceOptions, SurfaceState, SurfaceStrategy};
use serde::Deserialize;
use serde_json::{json, Value};
use std::any::Any;
use std::path::Path;
use surface_algorithms::{
    estimate_normals, normalize_normals, orient_normals_consistent_tangent_plane,
    orient_normals_to_align_with_direction, orient_normals_towards_viewpoint, NormalEstimation,
};
use surface_core::{
    Drawable, Error, NormalPoint3f, Point3f, PointCloud, Result, TriangleMesh, Vector3f,
};
use surface_io::MeshWriteOptions;

pub const ESTIMATE_NORMALS: &str = "estimate_normals";
pub const ORIENT_NORMALS_CONSISTENT_TANGENT_PLANE: &str = "orient_normals_consistent_tangent_plane";
pub const ORIENT_NORMALS_TOWARDS_CAMERA_LOCATION: &str = "orient_normals_towards_camera_location";
pub const ORIENT_NORMALS_TO_ALIGN_WITH_DIRECTION: &str = "orient_normals_to_align_with_direction";
pub const NORMALIZE_NORMALS: &str = "normalize_normals";
pub const SCREENED_POISSON: &str = "surface_reconstruction_screened_poisson";

/// Deepest octree a `width` request may ask for
const MAX_DERIVED_DEPTH: usize = 12;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimateNormalsParams {
    pub fast_normal_computation: bool,
    /// Shape of the buffer existing normals are reset to; any value resets them
    pub normals: Option<Value>,
    /// Neighbours per point
    pub max_nn: usize,
}

impl Default for EstimateNormalsParams {
    fn default() -> Self {
        Self {
            fast_normal_computation: true,
            normals: None,
            max_nn: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OrientTangentPlaneParams {
    k: usize,
}

impl Default for OrientTangentPlaneParams {
    fn default() -> Self {
        Self { k: 100 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CameraLocationParams {
    camera_location: [f32; 3],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct AlignDirectionParams {
    orientation_reference: [f32; 3],
}

impl Default for AlignDirectionParams {
    fn default() -> Self {
        Self {
            orientation_reference: [0.0, 0.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScreenedPoissonParams {
    pub depth: usize,
    /// Finest cell width; when positive it decides the depth
    pub width: f32,
    pub scale: f32,
    pub linear_fit: bool,
    /// Worker threads; `-1` or `0` uses the shared pool
    pub n_threads: i64,
}

impl Default for ScreenedPoissonParams {
    fn default() -> Self {
        Self {
            depth: 8,
            width: 0.0,
            scale: 1.1,
            linear_fit: false,
            n_threads: -1,
        }
    }
}

impl ScreenedPoissonParams {
    /// Engine configuration for a cloud whose bounding box spans `extent` on its largest side
    pub fn to_config(&self, extent: f32) -> PoissonConfig {
        let depth = if self.width > 0.0 && extent > 0.0 {
            let cells = (extent * self.scale / self.width).max(1.0);
            (cells.log2().ceil() as usize).clamp(1, MAX_DERIVED_DEPTH)
        } else {
            self.depth
        };

        PoissonConfig {
            depth,
            density_estimation_depth: depth.saturating_sub(2).max(1),
            threads: usize::try_from(self.n_threads).ok().filter(|&n| n > 0),
            ..PoissonConfig::default()
        }
    }
}

/// Surface reconstruction in Open3D's vocabulary
pub struct Open3dSurface {
    parameters: ParameterSchema,
    state: SurfaceState,
    point_cloud: PointCloud<NormalPoint3f>,
    mesh: TriangleMesh,
}

impl Open3dSurface {
    /// An empty backend with the default schema and nothing loaded
    pub fn new() -> Self {
        Self {
            parameters: Self::default_schema(),
            state: SurfaceState::default(),
            point_cloud: PointCloud::new(),
            mesh: TriangleMesh::new(),
        }
    }

    pub fn default_schema() -> ParameterSchema {
        ParameterSchema::new()
            .with_filter(
                ESTIMATE_NORMALS,
                FilterParameters::List(vec![
                    spec("fast_normal_computation", "Fast normal estimation", true),
                    spec("normals", "Points normals", json!([1, 3])),
                ]),
            )
            .with_filter(
                ORIENT_NORMALS_CONSISTENT_TANGENT_PLANE,
                FilterParameters::List(vec![spec("k", "Nearest neighbors", 100)]),
            )
            .with_filter(
                SCREENED_POISSON,
                FilterParameters::List(vec![
                    spec("depth", "Maximum depth of the tree", 8),
                    spec("width", "Target width", 0),
                    spec("scale", "Ratio between the diameter of the cube", 1.1),
                    spec("linear_fit", "Use linear interpolation?", false),
                    spec("n_threads", "Number of threads used for reconstruction", -1),
                ]),
            )
    }

    pub fn point_cloud(&self) -> &PointCloud<NormalPoint3f> {
        &self.point_cloud
    }

    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    /// Replace the cloud, e.g. with points that did not come from a file
    pub fn set_point_cloud(&mut self, cloud: PointCloud<NormalPoint3f>) {
        self.state.normals_estimated = false;
        self.point_cloud = cloud;
    }

    /// Reset the normals and estimate them again from the point positions
    pub fn estimate_normals(&mut self, params: &EstimateNormalsParams) -> Result<&mut Self> {
        for point in self.point_cloud.iter_mut() {
            point.normal = Vector3f::zeros();
        }

        let positions = self.point_cloud.positions();
        let normals = estimate_normals(
            &positions,
            &NormalEstimation {
                k: params.max_nn,
                fast: params.fast_normal_computation,
            },
        )?;
        self.point_cloud.set_normals(&normals);
        self.state.normals_estimated = true;

        Ok(self)
    }

    fn update_normals<F>(&mut self, update: F) -> Result<()>
    where
        F: FnOnce(&[Point3f], &mut [Vector3f]) -> Result<()>,
    {
        if !self.point_cloud.has_normals() {
            return Err(Error::InvalidData(
                "The point cloud has no normals to orient; run estimate_normals first".to_string(),
            ));
        }
        let positions = self.point_cloud.positions();
        let mut normals = self.point_cloud.normals();
        update(&positions, &mut normals)?;
        self.point_cloud.set_normals(&normals);
        Ok(())
    }

    fn create_from_point_cloud_poisson(&mut self, params: &ScreenedPoissonParams) -> Result<()> {
        if params.linear_fit {
            log::debug!("linear_fit is not supported by the Poisson engine; ignored");
        }
        let (min, max) = self.point_cloud.bounding_box();
        let extent = (max - min).max();
        let config = params.to_config(extent);

        self.mesh = screened_poisson(&self.point_cloud, &config)?;
        Ok(())
    }

    fn apply_filter(&mut self, name: &str, kv: &KeyValues) -> Result<()> {
        log::info!("Applying {}", name);
        match name {
            ESTIMATE_NORMALS => {
                let params: EstimateNormalsParams = decode_stage(name, kv)?;
                self.estimate_normals(&params)?;
            }
            ORIENT_NORMALS_CONSISTENT_TANGENT_PLANE => {
                let params: OrientTangentPlaneParams = decode_stage(name, kv)?;
                self.update_normals(|points, normals| {
                    orient_normals_consistent_tangent_plane(points, normals, params.k)
                })?;
            }
            ORIENT_NORMALS_TOWARDS_CAMERA_LOCATION => {
                let params: CameraLocationParams = decode_stage(name, kv)?;
                let camera = Point3f::from(params.camera_location);
                self.update_normals(|points, normals| {
                    orient_normals_towards_viewpoint(points, normals, &camera);
                    Ok(())
                })?;
            }
            ORIENT_NORMALS_TO_ALIGN_WITH_DIRECTION => {
                let params: AlignDirectionParams = decode_stage(name, kv)?;
                let direction = Vector3f::from(params.orientation_reference);
                self.update_normals(|_, normals| {
                    orient_normals_to_align_with_direction(normals, &direction);
                    Ok(())
                })?;
            }
            NORMALIZE_NORMALS => {
                self.update_normals(|_, normals| {
                    normalize_normals(normals);
                    Ok(())
                })?;
            }
            SCREENED_POISSON => {
                let params: ScreenedPoissonParams = decode_stage(name, kv)?;
                self.create_from_point_cloud_poisson(&params)?;
            }
            _ => return Err(Error::UnknownFilter { name: name.to_string() }),
        }
        self.state.applied_filters = true;
        Ok(())
    }
}

impl Default for Open3dSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceStrategy for Open3dSurface {
    fn create(options: &SurfaceOptions) -> Result<Self> {
        let mut surface = Self {
            state: SurfaceState::initialize(options)?,
            ..Self::new()
        };
        if options.filter_script_file.is_some() {
            log::debug!("Open3dSurface does not run filter scripts; ignoring filter_script_file");
        }
        if let Some(path) = options.point_cloud_file.as_deref() {
            surface.load_file(path)?;
        }
        Ok(surface)
    }

    fn parameters(&self) -> &ParameterSchema {
        &self.parameters
    }

    fn state(&self) -> &SurfaceState {
        &self.state
    }

    fn load_file(&mut self, path: &Path) -> Result<()> {
        let (cloud, normals) = surface_io::read_point_cloud_with_normals(path)?;
        let mut point_cloud = PointCloud::from_positions(&cloud.points);
        if let Some(normals) = normals {
            point_cloud.set_normals(&normals);
        }
        log::info!("Loaded {} points from {}", point_cloud.len(), path.display());

        self.set_point_cloud(point_cloud);
        Ok(())
    }

    fn poisson_mesh(&mut self, params: &PoissonParams) -> Result<&TriangleMesh> {
        self.state.applied_filters = false;

        let chain = self.filter_chain(params)?;
        chain.for_each_stage(|name, kv| self.apply_filter(name, kv))?;

        if params.save_file {
            let output_file = self.state.resolve_output_file(params)?;
            let options = MeshWriteOptions {
                binary: false,
                write_vertex_normals: true,
                write_vertex_colors: true,
            };
            surface_io::write_triangle_mesh(&self.mesh, &output_file, &options)?;
        }

        Ok(&self.mesh)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
