//! MeshLab-style backend
//!
//! Filters use MeshLab's names and arguments and operate on a [`MeshSet`] of layers:
//! the loaded point cloud is layer 0, and every filter that produces geometry pushes
//! a new current layer. A JSON filter script, when configured, replaces the default
//! chain.

use crate::filter_script::FilterScript;
use crate::parameters::{decode_stage, spec, FilterParameters, KeyValues, ParameterSchema, PoissonParams};
use crate::poisson::{screened_poisson, PoissonConfig};
use crate::strategy::{SurfaceOptions, SurfaceState, SurfaceStrategy};
use serde::Deserialize;
use serde_json::json;
use std::any::Any;
use std::path::Path;
use surface_algorithms::{
    estimate_normals, orient_normals_consistent_tangent_plane, orient_normals_towards_viewpoint,
    poisson_disk_subsample, smooth_normals, NormalEstimation, PoissonDiskSampling,
};
use surface_core::{Error, NormalPoint3f, Point3f, PointCloud, Result, TriangleMesh};
use surface_io::MeshWriteOptions;

pub const POINT_CLOUD_SIMPLIFICATION: &str = "point_cloud_simplification";
pub const COMPUTE_NORMALS_FOR_POINT_SETS: &str = "compute_normals_for_point_sets";
pub const SCREENED_POISSON: &str = "surface_reconstruction_screened_poisson";

/// Layers of geometry, in the order filters produced them
#[derive(Debug, Clone, Default)]
pub struct MeshSet {
    layers: Vec<TriangleMesh>,
    current: usize,
}

impl MeshSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a layer and make it current
    pub fn add_mesh(&mut self, mesh: TriangleMesh) {
        self.layers.push(mesh);
        self.current = self.layers.len() - 1;
    }

    pub fn current_mesh(&self) -> Option<&TriangleMesh> {
        self.layers.get(self.current)
    }

    pub fn current_mesh_mut(&mut self) -> Option<&mut TriangleMesh> {
        self.layers.get_mut(self.current)
    }

    pub fn mesh(&self, index: usize) -> Option<&TriangleMesh> {
        self.layers.get(index)
    }

    pub fn set_current_mesh(&mut self, index: usize) -> Result<()> {
        if index >= self.layers.len() {
            return Err(Error::InvalidData(format!(
                "No layer {} (the set has {})",
                index,
                self.layers.len()
            )));
        }
        self.current = index;
        Ok(())
    }

    pub fn current_mesh_id(&self) -> usize {
        self.current
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn clear(&mut self) {
        self.layers.clear();
        self.current = 0;
    }

    /// Vertices of every layer, with their normals
    pub fn merged_point_cloud(&self) -> PointCloud<NormalPoint3f> {
        self.layers.iter().flat_map(|m| m.to_point_cloud()).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimplificationParams {
    pub samplenum: usize,
    /// Disk radius; `0` derives it from `samplenum`
    pub radius: f32,
    pub bestsampleflag: bool,
    pub bestsamplepool: usize,
    pub exactnumflag: bool,
}

impl Default for SimplificationParams {
    fn default() -> Self {
        Self {
            samplenum: 1000,
            radius: 0.0,
            bestsampleflag: true,
            bestsamplepool: 10,
            exactnumflag: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComputeNormalsParams {
    pub k: usize,
    pub smoothiter: usize,
    pub flipflag: bool,
    pub viewpos: [f32; 3],
}

impl Default for ComputeNormalsParams {
    fn default() -> Self {
        Self {
            k: 5,
            smoothiter: 0,
            flipflag: false,
            viewpos: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScreenedPoissonParams {
    pub depth: usize,
    pub cgdepth: usize,
    pub fulldepth: usize,
    pub visiblelayer: bool,
    pub scale: f32,
    pub samplespernode: f32,
    pub pointweight: f64,
    pub iters: usize,
    pub confidence: bool,
    pub preclean: bool,
}

impl Default for ScreenedPoissonParams {
    fn default() -> Self {
        Self {
            depth: 8,
            cgdepth: 0,
            fulldepth: 5,
            visiblelayer: false,
            scale: 1.1,
            samplespernode: 1.5,
            pointweight: 4.0,
            iters: 8,
            confidence: false,
            preclean: false,
        }
    }
}

impl ScreenedPoissonParams {
    pub fn to_config(&self) -> PoissonConfig {
        PoissonConfig {
            depth: self.depth,
            density_estimation_depth: self.fulldepth.min(self.depth),
            screening: self.pointweight,
            relaxation_iters: self.iters,
            threads: None,
        }
    }

    fn log_unsupported(&self) {
        let defaults = Self::default();
        if self.cgdepth != defaults.cgdepth {
            log::debug!("cgdepth is not supported by the Poisson engine; ignored");
        }
        if self.scale != defaults.scale {
            log::debug!("scale is not supported by the Poisson engine; ignored");
        }
        if self.samplespernode != defaults.samplespernode {
            log::debug!("samplespernode is not supported by the Poisson engine; ignored");
        }
        if self.confidence {
            log::debug!("confidence is not supported by the Poisson engine; ignored");
        }
    }
}

/// Surface reconstruction in MeshLab's vocabulary
pub struct MeshlabSurface {
    parameters: ParameterSchema,
    state: SurfaceState,
    mesh_set: MeshSet,
    filter_script: Option<FilterScript>,
}

impl MeshlabSurface {
    pub fn new() -> Self {
        Self {
            parameters: Self::default_schema(),
            state: SurfaceState::default(),
            mesh_set: MeshSet::new(),
            filter_script: None,
        }
    }

    pub fn default_schema() -> ParameterSchema {
        ParameterSchema::new()
            .with_filter(
                POINT_CLOUD_SIMPLIFICATION,
                FilterParameters::List(vec![
                    spec("samplenum", "Number of samples", 1000),
                    spec("radius", "Explicit Radius", 0),
                    spec("bestsampleflag", "Best Sample Heuristic", true),
                    spec("bestsamplepool", "Best Sample Pool Size", 10),
                    spec("exactnumflag", "Exact number of samples", false),
                ]),
            )
            .with_filter(
                COMPUTE_NORMALS_FOR_POINT_SETS,
                FilterParameters::List(vec![
                    spec("k", "Neighbour num", 5),
                    spec("smoothiter", "Smooth Iteration", 0),
                    spec("flipflag", "Flip normals w.r.t. viewpoint", false),
                    spec("viewpos", "Viewpoint Pos.", json!([0, 0, 0])),
                ]),
            )
            .with_filter(
                SCREENED_POISSON,
                FilterParameters::List(vec![
                    spec("depth", "Reconstruction Depth", 8),
                    spec("cgdepth", "Conjugate Gradients Depth", 0),
                    spec("fulldepth", "Adaptive Octree Depth", 5),
                    spec("visiblelayer", "Merge all visible layers", false),
                    spec("scale", "Scale Factor", 1.1),
                    spec("samplespernode", "Minimum Number of Samples", 1.5),
                    spec("pointweight", "Interpolation Weight", 4),
                    spec("iters", "Gauss-Seidel Relaxations", 8),
                    spec("confidence", "Confidence Flag", false),
                    spec("preclean", "Pre-Clean", false),
                ]),
            )
    }

    pub fn mesh_set(&self) -> &MeshSet {
        &self.mesh_set
    }

    pub fn filter_script(&self) -> Option<&FilterScript> {
        self.filter_script.as_ref()
    }

    pub fn load_filter_script(&mut self, path: &Path) -> Result<()> {
        self.filter_script = Some(FilterScript::from_file(path)?);
        self.state.filter_script_file = Some(path.to_path_buf());
        Ok(())
    }

    /// Replace every layer with `mesh`
    pub fn set_mesh(&mut self, mesh: TriangleMesh) {
        self.mesh_set.clear();
        self.mesh_set.add_mesh(mesh);
        self.state.normals_estimated = false;
    }

    fn current_mesh(&self) -> Result<&TriangleMesh> {
        self.mesh_set
            .current_mesh()
            .ok_or_else(|| Error::InvalidData("No point cloud has been loaded".to_string()))
    }

    fn point_cloud_simplification(&mut self, params: &SimplificationParams) -> Result<()> {
        if !params.bestsampleflag || params.bestsamplepool != 10 {
            log::debug!("bestsampleflag/bestsamplepool do not change the greedy sampler; ignored");
        }
        let layer = self.current_mesh()?;
        let indices = poisson_disk_subsample(
            &layer.vertices,
            &PoissonDiskSampling {
                sample_count: params.samplenum,
                radius: params.radius,
                exact_count: params.exactnumflag,
            },
        );

        let vertices = indices.iter().map(|&i| layer.vertices[i]).collect();
        let mut sampled = TriangleMesh::from_vertices_and_faces(vertices, Vec::new());
        if let Some(normals) = &layer.normals {
            sampled.set_normals(indices.iter().map(|&i| normals[i]).collect());
        }
        log::debug!("Sampled {} of {} points", indices.len(), layer.vertex_count());

        self.mesh_set.add_mesh(sampled);
        Ok(())
    }

    fn compute_normals_for_point_sets(&mut self, params: &ComputeNormalsParams) -> Result<()> {
        let layer = self
            .mesh_set
            .current_mesh_mut()
            .ok_or_else(|| Error::InvalidData("No point cloud has been loaded".to_string()))?;

        let points = &layer.vertices;
        let mut normals = estimate_normals(
            points,
            &NormalEstimation {
                k: params.k,
                fast: true,
            },
        )?;
        orient_normals_consistent_tangent_plane(points, &mut normals, params.k)?;
        if params.smoothiter > 0 {
            smooth_normals(points, &mut normals, params.k, params.smoothiter)?;
        }
        if params.flipflag {
            orient_normals_towards_viewpoint(points, &mut normals, &Point3f::from(params.viewpos));
        }

        layer.set_normals(normals);
        self.state.normals_estimated = true;
        Ok(())
    }

    fn surface_reconstruction_screened_poisson(&mut self, params: &ScreenedPoissonParams) -> Result<()> {
        params.log_unsupported();

        let mut cloud = if params.visiblelayer {
            // layers without normals (the raw scan, typically) cannot take part
            let merged = self.mesh_set.merged_point_cloud();
            let total = merged.len();
            let oriented: PointCloud<NormalPoint3f> =
                merged.into_iter().filter(NormalPoint3f::has_valid_normal).collect();
            log::debug!("Merged {} of {} layer points with normals", oriented.len(), total);
            oriented
        } else {
            self.current_mesh()?.to_point_cloud()
        };
        if params.preclean {
            let before = cloud.len();
            cloud = cloud.into_iter().filter(NormalPoint3f::has_valid_normal).collect();
            log::debug!("Pre-clean removed {} points", before - cloud.len());
        }
        if !cloud.has_normals() {
            return Err(Error::InvalidData(
                "The point cloud has no normals; run compute_normals_for_point_sets first"
                    .to_string(),
            ));
        }

        let mesh = screened_poisson(&cloud, &params.to_config())?;
        self.mesh_set.add_mesh(mesh);
        Ok(())
    }

    fn apply_filter(&mut self, name: &str, kv: &KeyValues) -> Result<()> {
        log::info!("Applying {}", name);
        match name {
            POINT_CLOUD_SIMPLIFICATION => {
                let params: SimplificationParams = decode_stage(name, kv)?;
                self.point_cloud_simplification(&params)?;
            }
            COMPUTE_NORMALS_FOR_POINT_SETS => {
                let params: ComputeNormalsParams = decode_stage(name, kv)?;
                self.compute_normals_for_point_sets(&params)?;
            }
            SCREENED_POISSON => {
                let params: ScreenedPoissonParams = decode_stage(name, kv)?;
                self.surface_reconstruction_screened_poisson(&params)?;
            }
            _ => return Err(Error::UnknownFilter { name: name.to_string() }),
        }
        self.state.applied_filters = true;
        Ok(())
    }
}

impl Default for MeshlabSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceStrategy for MeshlabSurface {
    fn create(options: &SurfaceOptions) -> Result<Self> {
        let mut surface = Self {
            state: SurfaceState::initialize(options)?,
            ..Self::new()
        };
        if let Some(path) = options.filter_script_file.as_deref() {
            surface.load_filter_script(path)?;
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
        let mut layer = TriangleMesh::from_vertices_and_faces(cloud.points, Vec::new());
        if let Some(normals) = normals {
            layer.set_normals(normals);
        }
        log::info!("Loaded {} points from {}", layer.vertex_count(), path.display());

        self.set_mesh(layer);
        Ok(())
    }

    fn poisson_mesh(&mut self, params: &PoissonParams) -> Result<&TriangleMesh> {
        self.state.applied_filters = false;

        if let Some(script) = self.filter_script.clone() {
            if params.filters.is_some() {
                log::warn!("A filter script is loaded; per-call filter overrides are ignored");
            }
            script.for_each_filter(|name, kv| self.apply_filter(name, kv))?;
        } else {
            let chain = self.filter_chain(params)?;
            chain.for_each_stage(|name, kv| self.apply_filter(name, kv))?;
        }

        if params.save_file {
            let output_file = self.state.resolve_output_file(params)?;
            surface_io::write_triangle_mesh(
                self.current_mesh()?,
                &output_file,
                &MeshWriteOptions::default(),
            )?;
        }

        self.current_mesh()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surface_core::Vector3f;

    fn sphere_layer(n: usize) -> TriangleMesh {
        let golden = std::f32::consts::PI * (3.0 - 5.0_f32.sqrt());
        let vertices = (0..n)
            .map(|i| {
                let y = 1.0 - 2.0 * (i as f32 + 0.5) / n as f32;
                let r = (1.0 - y * y).sqrt();
                let theta = golden * i as f32;
                Point3f::new(r * theta.cos(), y, r * theta.sin())
            })
            .collect();
        TriangleMesh::from_vertices_and_faces(vertices, Vec::new())
    }

    fn kv(value: serde_json::Value) -> KeyValues {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_mesh_set_layers() {
        let mut set = MeshSet::new();
        assert!(set.current_mesh().is_none());

        set.add_mesh(sphere_layer(10));
        set.add_mesh(sphere_layer(20));
        assert_eq!(set.layer_count(), 2);
        assert_eq!(set.current_mesh_id(), 1);
        assert_eq!(set.current_mesh().unwrap().vertex_count(), 20);
        assert_eq!(set.merged_point_cloud().len(), 30);

        set.set_current_mesh(0).unwrap();
        assert_eq!(set.current_mesh().unwrap().vertex_count(), 10);
        assert!(set.set_current_mesh(2).is_err());
    }

    #[test]
    fn test_schema_carries_corrected_sampling_defaults() {
        let chain = MeshlabSurface::default_schema().key_values();
        let sampling = chain.get(POINT_CLOUD_SIMPLIFICATION).unwrap();
        assert_eq!(sampling["bestsamplepool"], json!(10));
        assert_eq!(sampling["exactnumflag"], json!(false));

        let params: ScreenedPoissonParams =
            decode_stage(SCREENED_POISSON, chain.get(SCREENED_POISSON).unwrap()).unwrap();
        let config = params.to_config();
        assert_eq!(config.depth, 8);
        assert_eq!(config.density_estimation_depth, 5);
        assert_eq!(config.relaxation_iters, 8);
        assert!((config.screening - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_simplification_pushes_a_layer() {
        let mut surface = MeshlabSurface::new();
        surface.set_mesh(sphere_layer(500));

        surface
            .apply_filter(
                POINT_CLOUD_SIMPLIFICATION,
                &kv(json!({"samplenum": 100, "exactnumflag": true})),
            )
            .unwrap();
        assert_eq!(surface.mesh_set().layer_count(), 2);
        assert_eq!(surface.mesh_set().current_mesh().unwrap().vertex_count(), 100);
        assert_eq!(surface.mesh_set().mesh(0).unwrap().vertex_count(), 500);
        assert!(surface.applied_filters());
    }

    #[test]
    fn test_compute_normals_points_outwards() {
        let mut surface = MeshlabSurface::new();
        surface.set_mesh(sphere_layer(400));

        surface
            .apply_filter(COMPUTE_NORMALS_FOR_POINT_SETS, &kv(json!({"k": 10})))
            .unwrap();
        assert!(surface.normals_estimated());

        let layer = surface.mesh_set().current_mesh().unwrap();
        let normals = layer.normals.as_ref().unwrap();
        // the seed is the highest point and turned towards +Z, so the whole sphere faces out
        let outward = layer
            .vertices
            .iter()
            .zip(normals)
            .filter(|(p, n)| n.dot(&p.coords) > 0.0)
            .count();
        assert_eq!(outward, 400);
    }

    #[test]
    fn test_flipflag_orients_towards_viewpoint() {
        let mut surface = MeshlabSurface::new();
        surface.set_mesh(sphere_layer(300));

        surface
            .apply_filter(
                COMPUTE_NORMALS_FOR_POINT_SETS,
                &kv(json!({"k": 10, "flipflag": true, "viewpos": [0, 0, 0]})),
            )
            .unwrap();
        let layer = surface.mesh_set().current_mesh().unwrap();
        let normals: &Vec<Vector3f> = layer.normals.as_ref().unwrap();
        assert!(layer
            .vertices
            .iter()
            .zip(normals)
            .all(|(p, n)| n.dot(&p.coords) < 0.0));
    }

    #[test]
    fn test_poisson_without_normals_fails() {
        let mut surface = MeshlabSurface::new();
        surface.set_mesh(sphere_layer(100));
        let err = surface
            .apply_filter(SCREENED_POISSON, &kv(json!({"depth": 5})))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_visiblelayer_merges_only_oriented_points() {
        let mut surface = MeshlabSurface::new();
        surface.set_mesh(sphere_layer(800));
        surface
            .apply_filter(
                POINT_CLOUD_SIMPLIFICATION,
                &kv(json!({"samplenum": 400, "exactnumflag": true})),
            )
            .unwrap();
        surface
            .apply_filter(COMPUTE_NORMALS_FOR_POINT_SETS, &kv(json!({"k": 10})))
            .unwrap();

        // layer 0 still has no normals
        assert!(surface.mesh_set().mesh(0).unwrap().normals.is_none());
        surface
            .apply_filter(SCREENED_POISSON, &kv(json!({"depth": 5, "visiblelayer": true})))
            .unwrap();
        assert_eq!(surface.mesh_set().layer_count(), 3);
        assert!(surface.mesh_set().current_mesh().unwrap().face_count() > 0);
    }

    #[test]
    fn test_preclean_drops_degenerate_normals() {
        let mut layer = sphere_layer(300);
        let normals: Vec<Vector3f> = layer
            .vertices
            .iter()
            .enumerate()
            .map(|(i, p)| if i % 10 == 0 { Vector3f::zeros() } else { p.coords })
            .collect();
        layer.set_normals(normals);

        let mut surface = MeshlabSurface::new();
        surface.set_mesh(layer);
        let err = surface
            .apply_filter(SCREENED_POISSON, &kv(json!({"depth": 4, "fulldepth": 3})))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));

        surface
            .apply_filter(
                SCREENED_POISSON,
                &kv(json!({"depth": 4, "fulldepth": 3, "preclean": true})),
            )
            .unwrap();
        assert_eq!(surface.mesh_set().layer_count(), 2);
        assert!(surface.mesh_set().current_mesh().unwrap().face_count() > 0);
    }

    #[test]
    fn test_flat_grid_simplify_and_compute_normals() {
        let vertices = (0..30)
            .flat_map(|i| (0..30).map(move |j| Point3f::new(i as f32 * 0.1, j as f32 * 0.1, 0.0)))
            .collect();
        let mut surface = MeshlabSurface::new();
        surface.set_mesh(TriangleMesh::from_vertices_and_faces(vertices, Vec::new()));

        surface
            .apply_filter(
                POINT_CLOUD_SIMPLIFICATION,
                &kv(json!({"samplenum": 200, "exactnumflag": true})),
            )
            .unwrap();
        surface
            .apply_filter(COMPUTE_NORMALS_FOR_POINT_SETS, &kv(json!({"k": 8})))
            .unwrap();

        let layer = surface.mesh_set().current_mesh().unwrap();
        assert_eq!(layer.vertex_count(), 200);
        assert!(layer.normals.as_ref().unwrap().iter().all(|n| n.z > 0.99));
    }

    #[test]
    fn test_unknown_filter() {
        let mut surface = MeshlabSurface::new();
        surface.set_mesh(sphere_layer(10));
        let err = surface.apply_filter("estimate_normals", &KeyValues::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownFilter { ref name } if name == "estimate_normals"));
    }
}
