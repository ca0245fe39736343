//! Filter scripts: a saved, ordered list of filters with their arguments
//!
//! ```json
//! [
//!   {"filter": "compute_normals_for_point_sets", "params": {"k": 10}},
//!   {"filter": "surface_reconstruction_screened_poisson", "params": {"depth": 6}}
//! ]
//! ```

use crate::parameters::KeyValues;
use crate::strategy::ensure_exists;
use serde::{Deserialize, Serialize};
use std::path::Path;
use surface_core::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptFilter {
    pub filter: String,
    #[serde(default)]
    pub params: KeyValues,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterScript {
    pub filters: Vec<ScriptFilter>,
}

impl FilterScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: &str, params: KeyValues) -> Self {
        self.filters.push(ScriptFilter {
            filter: filter.to_string(),
            params,
        });
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_exists(path)?;
        let script = Self::from_json(&std::fs::read_to_string(path)?)?;
        log::info!("Loaded filter script {} ({} filters)", path.display(), script.len());
        Ok(script)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Call `callback` for every filter in script order, arguments or not.
    /// Stops at the first error.
    pub fn for_each_filter<F>(&self, mut callback: F) -> Result<usize>
    where
        F: FnMut(&str, &KeyValues) -> Result<()>,
    {
        for entry in &self.filters {
            callback(&entry.filter, &entry.params)?;
        }
        Ok(self.filters.len())
    }
}
