//! Pluggable upscaler backends and the scaler entries they contribute.
//!
//! Backends are registered explicitly with an [`UpscalerRegistry`], either
//! directly or from a plugin module loader, and instantiated on every
//! rebuild of the scaler list.

use std::fmt;
use std::path::Path;

use crate::model::{ModelCandidate, ModelLocator};

mod builtin;
mod model_dir;
mod registry;

pub use builtin::{Passthrough, PassthroughKind};
pub use model_dir::{ModelDirSpec, ModelDirUpscaler, ESRGAN, LDSR, SWINIR};
pub use registry::{
    options_key, ModuleLoader, RegisteredUpscaler, UpscalerClassId, UpscalerFactory,
    UpscalerRegistry,
};

/// Scale factor used when a backend does not specify one
pub const DEFAULT_SCALE: u32 = 4;

/// An upscaling backend instance
pub trait Upscaler: Send + Sync {
    /// Display name of the backend
    fn name(&self) -> &str;

    /// Scaler entries exposed by this backend
    fn scalers(&self) -> Vec<UpscalerData>;

    /// No-op or plain resampling backends that sort ahead of model-based ones
    fn is_passthrough(&self) -> bool {
        false
    }
}

/// Everything a backend gets when it is instantiated
pub struct UpscalerInit<'a> {
    /// Root of the canonical model tree
    pub models_path: &'a Path,
    /// User override for this backend's model directory
    pub user_path: Option<&'a Path>,
    pub locator: &'a ModelLocator,
}

/// Backend reference stamped on an entry by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub id: UpscalerClassId,
    pub type_name: String,
    pub passthrough: bool,
}

/// A named scaler configuration
#[derive(Debug, Clone, PartialEq)]
pub struct UpscalerData {
    pub name: String,
    pub data_path: Option<ModelCandidate>,
    pub scale: u32,
    backend: Option<Backend>,
}

impl UpscalerData {
    pub fn new(name: impl Into<String>, data_path: Option<ModelCandidate>) -> Self {
        Self {
            name: name.into(),
            data_path,
            scale: DEFAULT_SCALE,
            backend: None,
        }
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    /// Backend that produced this entry, once it went through the registry
    pub fn backend(&self) -> Option<&Backend> {
        self.backend.as_ref()
    }

    pub fn is_passthrough(&self) -> bool {
        self.backend.as_ref().map(|b| b.passthrough).unwrap_or(false)
    }

    pub(crate) fn set_backend(&mut self, backend: Backend) {
        self.backend = Some(backend);
    }

    /// Sort key: pass-through entries first, everything else by lowercase name
    pub(crate) fn sort_key(&self) -> String {
        if self.is_passthrough() {
            String::new()
        } else {
            self.name.to_lowercase()
        }
    }
}

impl fmt::Display for UpscalerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (x{})", self.name, self.scale)?;
        if let Some(path) = &self.data_path {
            write!(f, " <- {}", path)?;
        }
        Ok(())
    }
}
