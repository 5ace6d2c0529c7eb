//! Registry of upscaler backends and the merged, sorted scaler list.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::CommandLineOptions;
use crate::error::Result;
use crate::model::ModelLocator;

use super::{builtin, model_dir, Backend, Upscaler, UpscalerData, UpscalerInit};

/// Builds a backend instance
pub type UpscalerFactory = fn(&UpscalerInit<'_>) -> Result<Box<dyn Upscaler>>;

/// Registers the backends of one plugin module
pub type ModuleLoader = fn(&mut UpscalerRegistry) -> Result<()>;

/// Identity of one registration. Registering the same type name again yields
/// a new id, so a stale registration can be forbidden without affecting its
/// replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpscalerClassId(u64);

impl fmt::Display for UpscalerClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct RegisteredUpscaler {
    pub id: UpscalerClassId,
    pub type_name: String,
    factory: UpscalerFactory,
}

struct PluginModule {
    name: String,
    loader: ModuleLoader,
    loaded: bool,
}

/// Option key holding a backend's model directory override:
/// `UpscalerESRGAN` -> `esrgan_models_path`.
pub fn options_key(type_name: &str) -> String {
    format!(
        "{}_models_path",
        type_name.to_lowercase().replace("upscaler", "")
    )
}

#[derive(Default)]
pub struct UpscalerRegistry {
    modules: Vec<PluginModule>,
    classes: Vec<RegisteredUpscaler>,
    next_id: u64,
    builtin: HashSet<UpscalerClassId>,
    forbidden: HashSet<UpscalerClassId>,
    instances: Vec<(UpscalerClassId, Box<dyn Upscaler>)>,
    scalers: Vec<UpscalerData>,
}

impl UpscalerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the pass-through backends registered and the bundled
    /// model backends available as plugin modules.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register(&mut registry);
        registry.add_module("esrgan_model", model_dir::register_esrgan);
        registry.add_module("swinir_model", model_dir::register_swinir);
        registry.add_module("ldsr_model", model_dir::register_ldsr);
        registry
    }

    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        factory: UpscalerFactory,
    ) -> UpscalerClassId {
        self.next_id += 1;
        let id = UpscalerClassId(self.next_id);
        let type_name = type_name.into();
        debug!("Registered upscaler {} {}", type_name, id);
        self.classes.push(RegisteredUpscaler {
            id,
            type_name,
            factory,
        });
        id
    }

    /// Add a plugin module; its loader runs on the next rebuild.
    pub fn add_module(&mut self, name: impl Into<String>, loader: ModuleLoader) {
        self.modules.push(PluginModule {
            name: name.into(),
            loader,
            loaded: false,
        });
    }

    /// Run every module loader that has not succeeded yet. A failing loader
    /// is logged and retried on the next call. Returns the number of
    /// modules that failed.
    pub fn load_modules(&mut self) -> usize {
        let pending: Vec<(usize, String, ModuleLoader)> = self
            .modules
            .iter()
            .enumerate()
            .filter(|(_, module)| !module.loaded)
            .map(|(idx, module)| (idx, module.name.clone(), module.loader))
            .collect();

        let mut failed = 0;
        for (idx, name, loader) in pending {
            match loader(self) {
                Ok(()) => {
                    debug!("Loaded upscaler module {}", name);
                    self.modules[idx].loaded = true;
                }
                Err(e) => {
                    warn!("Failed to load upscaler module {}: {}", name, e);
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Rebuild the scaler list from every registered, non-forbidden backend.
    pub fn load_upscalers(
        &mut self,
        models_path: &Path,
        options: &CommandLineOptions,
        locator: &ModelLocator,
    ) -> &[UpscalerData] {
        self.load_modules();

        let mut instances = Vec::new();
        let mut datas = Vec::new();
        for class in &self.classes {
            if self.forbidden.contains(&class.id) {
                continue;
            }

            let key = options_key(&class.type_name);
            let init = UpscalerInit {
                models_path,
                user_path: options.get(&key),
                locator,
            };

            let upscaler = match (class.factory)(&init) {
                Ok(upscaler) => upscaler,
                Err(e) => {
                    warn!("Skipping upscaler {}: {}", class.type_name, e);
                    continue;
                }
            };

            let backend = Backend {
                id: class.id,
                type_name: class.type_name.clone(),
                passthrough: upscaler.is_passthrough(),
            };
            datas.extend(upscaler.scalers().into_iter().map(|mut data| {
                data.set_backend(backend.clone());
                data
            }));
            instances.push((class.id, upscaler));
        }

        datas.sort_by_cached_key(UpscalerData::sort_key);
        info!("Loaded {} upscalers", datas.len());

        self.instances = instances;
        self.scalers = datas;
        &self.scalers
    }

    /// Rebuild, then remember every backend registered so far as built-in.
    pub fn list_builtin_upscalers(
        &mut self,
        models_path: &Path,
        options: &CommandLineOptions,
        locator: &ModelLocator,
    ) {
        self.load_upscalers(models_path, options, locator);
        self.builtin = self.classes.iter().map(|class| class.id).collect();
    }

    /// Permanently exclude every backend registered after the built-in
    /// snapshot.
    pub fn forbid_loaded_nonbuiltin_upscalers(&mut self) {
        for class in &self.classes {
            if !self.builtin.contains(&class.id) {
                debug!("Forbidding upscaler {} {}", class.type_name, class.id);
                self.forbidden.insert(class.id);
            }
        }
    }

    pub fn scalers(&self) -> &[UpscalerData] {
        &self.scalers
    }

    pub fn classes(&self) -> impl Iterator<Item = &RegisteredUpscaler> {
        self.classes.iter()
    }

    pub fn is_builtin(&self, id: UpscalerClassId) -> bool {
        self.builtin.contains(&id)
    }

    pub fn is_forbidden(&self, id: UpscalerClassId) -> bool {
        self.forbidden.contains(&id)
    }

    /// Case-insensitive lookup by scaler name
    pub fn find_scaler(&self, name: &str) -> Option<&UpscalerData> {
        self.scalers
            .iter()
            .find(|data| data.name.eq_ignore_ascii_case(name))
    }

    /// Live backend instance behind a scaler entry
    pub fn backend(&self, data: &UpscalerData) -> Option<&dyn Upscaler> {
        let id = data.backend()?.id;
        self.instances
            .iter()
            .find(|(instance_id, _)| *instance_id == id)
            .map(|(_, upscaler)| upscaler.as_ref())
    }
}
