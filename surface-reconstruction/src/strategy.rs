//! The strategy interface every reconstruction backend implements

use crate::parameters::{FilterChain, ParameterSchema, PoissonParams};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::path::{Path, PathBuf};
use surface_core::{Error, Result, TriangleMesh};

/// Construction options shared by every backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceOptions {
    /// Point cloud loaded right after construction
    pub point_cloud_file: Option<PathBuf>,
    /// Where `poisson_mesh` saves the surface unless the call overrides it
    pub output_file: Option<PathBuf>,
    /// Backend-specific script of filters that replaces the default chain
    pub filter_script_file: Option<PathBuf>,
    /// Delete a stale output file at construction
    pub clean_up: bool,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            point_cloud_file: None,
            output_file: None,
            filter_script_file: None,
            clean_up: true,
        }
    }
}

impl SurfaceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_point_cloud_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.point_cloud_file = Some(path.into());
        self
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn with_filter_script_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.filter_script_file = Some(path.into());
        self
    }

    pub fn with_clean_up(mut self, clean_up: bool) -> Self {
        self.clean_up = clean_up;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Bookkeeping every backend carries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceState {
    pub output_file: Option<PathBuf>,
    pub filter_script_file: Option<PathBuf>,
    pub normals_estimated: bool,
    pub applied_filters: bool,
}

impl SurfaceState {
    /// Shared construction step: remove a stale output file when asked to and
    /// make sure the point cloud to load exists. Loading itself is up to the backend.
    pub fn initialize(options: &SurfaceOptions) -> Result<Self> {
        if options.clean_up {
            if let Some(output) = options.output_file.as_deref().filter(|p| p.exists()) {
                std::fs::remove_file(output)?;
                log::debug!("Removed previous output {}", output.display());
            }
        }

        if let Some(path) = options.point_cloud_file.as_deref() {
            ensure_exists(path)?;
        }

        Ok(Self {
            output_file: options.output_file.clone(),
            filter_script_file: options.filter_script_file.clone(),
            normals_estimated: false,
            applied_filters: false,
        })
    }

    /// The call's `output_file` wins over the one given at construction
    pub fn resolve_output_file(&self, params: &PoissonParams) -> Result<PathBuf> {
        params
            .output_file
            .clone()
            .or_else(|| self.output_file.clone())
            .ok_or_else(|| {
                Error::invalid_parameter(
                    "output_file",
                    "save_file is set but no output file was given".to_string(),
                )
            })
    }
}

/// Fail with [`Error::FileNotFound`] unless `path` exists
pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::FileNotFound {
            path: path.display().to_string(),
        })
    }
}

/// A Poisson surface reconstruction backend.
///
/// Implementors declare their stages in a [`ParameterSchema`]; `poisson_mesh`
/// flattens it, merges the call's overrides, and routes each stage to the
/// underlying library call.
pub trait SurfaceStrategy: Send {
    /// Build the backend, loading `options.point_cloud_file` if given
    fn create(options: &SurfaceOptions) -> Result<Self>
    where
        Self: Sized;

    /// Stage declarations with their default values
    fn parameters(&self) -> &ParameterSchema;

    fn state(&self) -> &SurfaceState;

    fn load_file(&mut self, path: &Path) -> Result<()>;

    /// Run the stages and return the reconstructed surface
    fn poisson_mesh(&mut self, params: &PoissonParams) -> Result<&TriangleMesh>;

    fn as_any(&self) -> &dyn Any;

    /// The schema serialized as a JSON object
    fn default_parameters(&self) -> Result<String> {
        Ok(serde_json::to_string(self.parameters())?)
    }

    fn default_parameters_value(&self) -> Value {
        serde_json::to_value(self.parameters()).unwrap_or(Value::Null)
    }

    /// Defaults flattened and merged with the call's overrides
    fn filter_chain(&self, params: &PoissonParams) -> Result<FilterChain> {
        let chain = self.parameters().key_values();
        match &params.filters {
            Some(overrides) => chain.merge(overrides),
            None => Ok(chain),
        }
    }

    /// `poisson_mesh` with parameters given as JSON text
    fn poisson_json(&mut self, json_filters: &str) -> Result<&TriangleMesh> {
        let params = PoissonParams::from_json(json_filters)?;
        self.poisson_mesh(&params)
    }

    fn normals_estimated(&self) -> bool {
        self.state().normals_estimated
    }

    fn applied_filters(&self) -> bool {
        self.state().applied_filters
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl dyn SurfaceStrategy {
    /// Whether the backend behind this trait object is an `S`
    pub fn is<S: SurfaceStrategy + 'static>(&self) -> bool {
        self.as_any().is::<S>()
    }

    pub fn downcast_ref<S: SurfaceStrategy + 'static>(&self) -> Option<&S> {
        self.as_any().downcast_ref::<S>()
    }
}
