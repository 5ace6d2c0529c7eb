//! Configuration types for sdkit

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application root; legacy model locations are resolved against it
    #[serde(default = "default_script_path")]
    pub script_path: PathBuf,

    /// Root of the canonical per-category model tree
    #[serde(default)]
    pub models_path: Option<PathBuf>,

    /// Text conditioning options
    #[serde(default)]
    pub text: TextOptions,

    /// Per-upscaler model directory overrides (`esrgan_models_path`, ...)
    #[serde(default)]
    pub upscaler_paths: CommandLineOptions,

    /// Preferred compute device ("cpu", "cuda", "metal")
    #[serde(default)]
    pub device: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            script_path: default_script_path(),
            models_path: None,
            text: TextOptions::default(),
            upscaler_paths: CommandLineOptions::default(),
            device: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_str(&raw)?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Models root, either configured explicitly or derived from the environment
    pub fn models_path(&self) -> PathBuf {
        if let Some(path) = &self.models_path {
            return path.clone();
        }
        default_models_dir(&self.script_path)
    }
}

/// Prompt-processing options shared with the text conditioning stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextOptions {
    /// Legacy emphasis parser; incompatible with OpenCLIP token numbering
    #[serde(default)]
    pub use_old_emphasis_implementation: bool,
}

/// Command-line style options keyed by option name.
///
/// Upscaler plugins read their model directory override from here under
/// `<name>_models_path`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandLineOptions(BTreeMap<String, PathBuf>);

impl CommandLineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PathBuf>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Path> {
        self.0.get(key).map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }
}

impl<K: Into<String>, V: Into<PathBuf>> FromIterator<(K, V)> for CommandLineOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn default_script_path() -> PathBuf {
    if let Ok(from_env) = std::env::var("SDKIT_ROOT") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sdkit")
}

fn default_models_dir(script_path: &Path) -> PathBuf {
    if let Ok(from_env) = std::env::var("SDKIT_MODELS_DIR") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    script_path.join("models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_models_path_wins() {
        let config = AppConfig {
            models_path: Some(PathBuf::from("/data/models")),
            ..Default::default()
        };
        assert_eq!(config.models_path(), PathBuf::from("/data/models"));
    }

    #[test]
    fn load_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "script_path": "/opt/webui",
                "text": { "use_old_emphasis_implementation": true },
                "upscaler_paths": { "esrgan_models_path": "/mnt/esrgan" }
            }"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.script_path, PathBuf::from("/opt/webui"));
        assert!(config.text.use_old_emphasis_implementation);
        assert_eq!(
            config.upscaler_paths.get("esrgan_models_path"),
            Some(Path::new("/mnt/esrgan"))
        );
        assert!(config.device.is_none());
    }

    #[test]
    fn options_collect_with_later_entries_winning() {
        let base = CommandLineOptions::from_iter([("esrgan_models_path", "/a")]);
        let merged: CommandLineOptions = base
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_path_buf()))
            .chain([
                ("esrgan_models_path".to_string(), PathBuf::from("/b")),
                ("ldsr_models_path".to_string(), PathBuf::from("/c")),
            ])
            .collect();

        assert_eq!(merged.get("esrgan_models_path"), Some(Path::new("/b")));
        assert_eq!(merged.get("ldsr_models_path"), Some(Path::new("/c")));
        assert!(merged.get("swinir_models_path").is_none());
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
