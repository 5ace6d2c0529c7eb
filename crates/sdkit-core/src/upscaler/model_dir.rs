//! Backends whose scalers are the model files found in a directory under the
//! models root.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::model::{ModelCandidate, ModelQuery};

use super::{Upscaler, UpscalerData, UpscalerInit, UpscalerRegistry, DEFAULT_SCALE};

/// Static description of a model-directory backend
#[derive(Debug)]
pub struct ModelDirSpec {
    pub type_name: &'static str,
    pub name: &'static str,
    /// Directory under the models root
    pub dir_name: &'static str,
    /// Downloaded on first use when no local model exists
    pub model_url: &'static str,
    /// Entry name used for the remote fallback
    pub model_name: &'static str,
    pub ext_filter: &'static [&'static str],
    pub scale: u32,
}

pub const ESRGAN: ModelDirSpec = ModelDirSpec {
    type_name: "UpscalerESRGAN",
    name: "ESRGAN",
    dir_name: "ESRGAN",
    model_url: "https://github.com/cszn/KAIR/releases/download/v1.0/ESRGAN.pth",
    model_name: "ESRGAN_4x",
    ext_filter: &[".pt", ".pth"],
    scale: DEFAULT_SCALE,
};

pub const SWINIR: ModelDirSpec = ModelDirSpec {
    type_name: "UpscalerSwinIR",
    name: "SwinIR",
    dir_name: "SwinIR",
    model_url: "https://github.com/JingyunLiang/SwinIR/releases/download/v0.0/003_realSR_BSRGAN_DFOWMFC_s64w8_SwinIR-L_x4_GAN.pth",
    model_name: "SwinIR 4x",
    ext_filter: &[".pt", ".pth", ".ckpt"],
    scale: DEFAULT_SCALE,
};

pub const LDSR: ModelDirSpec = ModelDirSpec {
    type_name: "UpscalerLDSR",
    name: "LDSR",
    dir_name: "LDSR",
    model_url: "https://heibox.uni-heidelberg.de/f/578df07c8fc04ffbadf3/?dl=1",
    model_name: "LDSR",
    ext_filter: &[".ckpt", ".safetensors"],
    scale: DEFAULT_SCALE,
};

pub struct ModelDirUpscaler {
    spec: &'static ModelDirSpec,
    model_path: PathBuf,
    user_path: Option<PathBuf>,
    scalers: Vec<UpscalerData>,
}

impl ModelDirUpscaler {
    pub fn new(spec: &'static ModelDirSpec, init: &UpscalerInit<'_>) -> Self {
        let model_path = init.models_path.join(spec.dir_name);
        let user_path = init.user_path.map(|p| p.to_path_buf());

        let query = ModelQuery::new(&model_path)
            .model_url(spec.model_url)
            .command_path(user_path.clone())
            .ext_filter(spec.ext_filter.iter().copied());

        let scalers = init
            .locator
            .discover(&query)
            .into_iter()
            .map(|candidate| {
                let name = match &candidate {
                    ModelCandidate::Remote(_) => spec.model_name.to_string(),
                    ModelCandidate::Local(_) => candidate.friendly_name(),
                };
                UpscalerData::new(name, Some(candidate)).with_scale(spec.scale)
            })
            .collect::<Vec<_>>();

        debug!("{} found {} models", spec.name, scalers.len());

        Self {
            spec,
            model_path,
            user_path,
            scalers,
        }
    }

    pub fn spec(&self) -> &'static ModelDirSpec {
        self.spec
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn user_path(&self) -> Option<&Path> {
        self.user_path.as_deref()
    }
}

impl Upscaler for ModelDirUpscaler {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn scalers(&self) -> Vec<UpscalerData> {
        self.scalers.clone()
    }
}

fn esrgan(init: &UpscalerInit<'_>) -> Result<Box<dyn Upscaler>> {
    Ok(Box::new(ModelDirUpscaler::new(&ESRGAN, init)))
}

fn swinir(init: &UpscalerInit<'_>) -> Result<Box<dyn Upscaler>> {
    Ok(Box::new(ModelDirUpscaler::new(&SWINIR, init)))
}

fn ldsr(init: &UpscalerInit<'_>) -> Result<Box<dyn Upscaler>> {
    Ok(Box::new(ModelDirUpscaler::new(&LDSR, init)))
}

pub(super) fn register_esrgan(registry: &mut UpscalerRegistry) -> Result<()> {
    registry.register(ESRGAN.type_name, esrgan);
    Ok(())
}

pub(super) fn register_swinir(registry: &mut UpscalerRegistry) -> Result<()> {
    registry.register(SWINIR.type_name, swinir);
    Ok(())
}

pub(super) fn register_ldsr(registry: &mut UpscalerRegistry) -> Result<()> {
    registry.register(LDSR.type_name, ldsr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpFetcher, ModelLocator};
    use std::sync::Arc;

    fn locator() -> ModelLocator {
        ModelLocator::new(Arc::new(HttpFetcher::new().unwrap()))
    }

    #[test]
    fn local_models_named_by_file() {
        let dir = tempfile::tempdir().unwrap();
        let esrgan_dir = dir.path().join("ESRGAN");
        std::fs::create_dir_all(&esrgan_dir).unwrap();
        std::fs::write(esrgan_dir.join("4x-UltraSharp.pth"), b"x").unwrap();
        std::fs::write(esrgan_dir.join("README.md"), b"x").unwrap();

        let locator = locator();
        let init = UpscalerInit {
            models_path: dir.path(),
            user_path: None,
            locator: &locator,
        };
        let upscaler = ModelDirUpscaler::new(&ESRGAN, &init);
        let scalers = upscaler.scalers();

        assert_eq!(scalers.len(), 1);
        assert_eq!(scalers[0].name, "4x-UltraSharp");
        assert_eq!(scalers[0].scale, 4);
        assert_eq!(
            scalers[0].data_path,
            Some(ModelCandidate::Local(esrgan_dir.join("4x-UltraSharp.pth")))
        );
    }

    #[test]
    fn user_path_is_searched_before_models_dir() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("custom");
        std::fs::create_dir_all(&user).unwrap();
        std::fs::write(user.join("swin.pth"), b"x").unwrap();
        std::fs::create_dir_all(dir.path().join("models/SwinIR")).unwrap();
        std::fs::write(dir.path().join("models/SwinIR/base.ckpt"), b"x").unwrap();

        let models = dir.path().join("models");
        let locator = locator();
        let init = UpscalerInit {
            models_path: &models,
            user_path: Some(Path::new(&user)),
            locator: &locator,
        };
        let upscaler = ModelDirUpscaler::new(&SWINIR, &init);
        let names: Vec<String> = upscaler.scalers().into_iter().map(|s| s.name).collect();

        assert_eq!(names, ["swin", "base"]);
        assert_eq!(upscaler.user_path(), Some(user.as_path()));
    }

    #[test]
    fn remote_fallback_uses_default_model_name() {
        let dir = tempfile::tempdir().unwrap();
        let locator = locator();
        let init = UpscalerInit {
            models_path: dir.path(),
            user_path: None,
            locator: &locator,
        };
        let upscaler = ModelDirUpscaler::new(&ESRGAN, &init);
        let scalers = upscaler.scalers();

        assert_eq!(scalers.len(), 1);
        assert_eq!(scalers[0].name, "ESRGAN_4x");
        assert_eq!(
            scalers[0].data_path,
            Some(ModelCandidate::Remote(ESRGAN.model_url.to_string()))
        );
    }
}
