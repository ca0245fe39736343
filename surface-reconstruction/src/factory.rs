//! Name-keyed registry of reconstruction backends
//!
//! Backends are registered by name and constructed lazily. Each concrete type is
//! built once; every later request for it, under any of its names, returns the same
//! shared instance.

use crate::meshlab::MeshlabSurface;
use crate::open3d::Open3dSurface;
use crate::strategy::{SurfaceOptions, SurfaceStrategy};
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use surface_core::{Error, Result};

/// A constructed backend, shared between every caller that asked for it
pub type SharedSurface = Arc<Mutex<Box<dyn SurfaceStrategy>>>;

/// Name used when `get` is called without one
pub const DEFAULT_METHOD: &str = "default";

type Constructor = fn(&SurfaceOptions) -> Result<Box<dyn SurfaceStrategy>>;

#[derive(Clone, Copy)]
struct Registration {
    type_id: TypeId,
    type_name: &'static str,
    construct: Constructor,
}

fn construct<S: SurfaceStrategy + 'static>(options: &SurfaceOptions) -> Result<Box<dyn SurfaceStrategy>> {
    Ok(Box::new(S::create(options)?))
}

pub struct SurfaceReconstruction {
    types: HashMap<String, Registration>,
    instances: HashMap<TypeId, SharedSurface>,
}

impl SurfaceReconstruction {
    /// A registry with `meshlab` (also as `pymeshlab`), `open3d` and `default` (Open3D)
    /// registered
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.insert::<MeshlabSurface>("meshlab");
        registry.insert::<MeshlabSurface>("pymeshlab");
        registry.insert::<Open3dSurface>("open3d");
        registry.insert::<Open3dSurface>(DEFAULT_METHOD);
        registry
    }

    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
            instances: HashMap::new(),
        }
    }

    /// The process-wide registry
    pub fn global() -> &'static Mutex<SurfaceReconstruction> {
        static GLOBAL: OnceLock<Mutex<SurfaceReconstruction>> = OnceLock::new();
        GLOBAL.get_or_init(|| Mutex::new(SurfaceReconstruction::new()))
    }

    /// Registration name derived from a type: `my_crate::PclSurface` -> `pcl`
    pub fn method_name<S: ?Sized + 'static>() -> String {
        let full = std::any::type_name::<S>();
        let path = full.split('<').next().unwrap_or(full);
        let last = path.rsplit("::").next().unwrap_or(path);
        let stem = match last.strip_suffix("Surface") {
            Some(stem) if !stem.is_empty() => stem,
            _ => last,
        };
        stem.to_lowercase()
    }

    fn insert<S: SurfaceStrategy + 'static>(&mut self, name: &str) {
        self.types.insert(
            name.to_string(),
            Registration {
                type_id: TypeId::of::<S>(),
                type_name: std::any::type_name::<S>(),
                construct: construct::<S>,
            },
        );
    }

    /// Register `S` under its derived name and return that name
    pub fn register_type<S: SurfaceStrategy + 'static>(&mut self) -> Result<String> {
        let name = Self::method_name::<S>();
        self.register_as::<S>(&name)?;
        Ok(name)
    }

    pub fn register_as<S: SurfaceStrategy + 'static>(&mut self, name: &str) -> Result<()> {
        if self.types.contains_key(name) {
            return Err(Error::AlreadyRegistered {
                name: name.to_string(),
            });
        }
        self.insert::<S>(name);
        log::debug!("Registered {} as \"{}\"", std::any::type_name::<S>(), name);
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    /// The backend registered as `method` (or `default`), built from `options` on
    /// first use. Options passed after the first construction are not applied.
    pub fn get(&mut self, method: Option<&str>, options: &SurfaceOptions) -> Result<SharedSurface> {
        let method = method.unwrap_or(DEFAULT_METHOD);
        let registration = *self.types.get(method).ok_or_else(|| Error::NotRegistered {
            method: method.to_string(),
        })?;

        if let Some(instance) = self.instances.get(&registration.type_id) {
            log::debug!("Reusing {} for \"{}\"", registration.type_name, method);
            return Ok(Arc::clone(instance));
        }

        let instance: SharedSurface = Arc::new(Mutex::new((registration.construct)(options)?));
        self.instances
            .insert(registration.type_id, Arc::clone(&instance));
        log::info!("Created {} for \"{}\"", registration.type_name, method);
        Ok(instance)
    }

    /// Drop every cached instance; the next `get` constructs afresh
    pub fn clear_instances(&mut self) {
        self.instances.clear();
    }
}

impl Default for SurfaceReconstruction {
    fn default() -> Self {
        Self::new()
    }
}

/// [`SurfaceReconstruction::get`] on the global registry
pub fn surface(method: Option<&str>, options: &SurfaceOptions) -> Result<SharedSurface> {
    SurfaceReconstruction::global().lock().get(method, options)
}
