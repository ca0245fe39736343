//! # Surface Reconstruction
//!
//! Poisson surface reconstruction behind one strategy interface.
//!
//! Each backend speaks the parameter dialect of a well-known library (Open3D or
//! MeshLab), declares its stages in a [`ParameterSchema`], and is obtained by name
//! from the [`SurfaceReconstruction`] registry:
//!
//! ```no_run
//! use surface_reconstruction::{surface, PoissonParams, SurfaceOptions, SurfaceStrategy};
//!
//! # fn main() -> surface_core::Result<()> {
//! let options = SurfaceOptions::new()
//!     .with_point_cloud_file("cloud.ply")
//!     .with_output_file("surface.ply");
//! let backend = surface(Some("meshlab"), &options)?;
//! let mut backend = backend.lock();
//! let mesh = backend.poisson_mesh(&PoissonParams::new())?;
//! println!("{} faces", mesh.face_count());
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod filter_script;
pub mod meshlab;
pub mod open3d;
pub mod parameters;
pub mod poisson;
pub mod strategy;

// Re-export commonly used items
pub use factory::{surface, SharedSurface, SurfaceReconstruction, DEFAULT_METHOD};
pub use filter_script::{FilterScript, ScriptFilter};
pub use meshlab::{MeshSet, MeshlabSurface};
pub use open3d::Open3dSurface;
pub use parameters::{
    decode_stage, spec, FilterChain, FilterParameters, KeyValues, ParameterSchema, ParameterSpec,
    PoissonParams,
};
pub use poisson::{screened_poisson, PoissonConfig, MIN_POISSON_POINTS};
pub use strategy::{SurfaceOptions, SurfaceState, SurfaceStrategy};
