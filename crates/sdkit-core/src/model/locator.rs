//! Best-effort discovery of model files on disk.
//!
//! Discovery never fails: directory errors and download errors are logged and
//! whatever was collected up to that point is returned, so a missing or
//! unreadable models directory cannot prevent startup.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;
use walkdir::WalkDir;

use crate::error::Result;
use crate::model::download::UrlFetcher;

/// Subfolder preferred over a user supplied search directory when present
const PRETRAINED_SUBDIR: &str = "experiments/pretrained_models";

/// A discovered model artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelCandidate {
    /// File on disk
    Local(PathBuf),
    /// URL to be fetched by the caller at point of use
    Remote(String),
}

impl ModelCandidate {
    pub fn is_remote(&self) -> bool {
        matches!(self, ModelCandidate::Remote(_))
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            ModelCandidate::Local(path) => Some(path.as_path()),
            ModelCandidate::Remote(_) => None,
        }
    }

    /// Final extension including the leading dot, or an empty string
    pub fn extension(&self) -> String {
        let name = friendly_source(&self.to_string());
        Path::new(&name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default()
    }

    pub fn friendly_name(&self) -> String {
        friendly_name(&self.to_string())
    }
}

impl fmt::Display for ModelCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelCandidate::Local(path) => write!(f, "{}", path.display()),
            ModelCandidate::Remote(url) => f.write_str(url),
        }
    }
}

/// Parameters of a single discovery pass
#[derive(Debug, Clone, Default)]
pub struct ModelQuery {
    /// Directory to search and to download into
    pub model_path: PathBuf,
    /// Fallback URL used when nothing is found locally
    pub model_url: Option<String>,
    /// User supplied directory searched before `model_path`
    pub command_path: Option<PathBuf>,
    /// Accepted extensions with leading dot; empty accepts everything
    pub ext_filter: Vec<String>,
    /// Fetch `model_url` immediately under this file name
    pub download_name: Option<String>,
    /// Path suffixes that are always rejected
    pub ext_blacklist: Vec<String>,
}

impl ModelQuery {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Default::default()
        }
    }

    pub fn model_url(mut self, url: impl Into<String>) -> Self {
        self.model_url = Some(url.into());
        self
    }

    pub fn command_path(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        self.command_path = path.map(Into::into);
        self
    }

    pub fn ext_filter<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ext_filter = exts.into_iter().map(Into::into).collect();
        self
    }

    pub fn download_name(mut self, name: impl Into<String>) -> Self {
        self.download_name = Some(name.into());
        self
    }

    pub fn ext_blacklist<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ext_blacklist = suffixes.into_iter().map(Into::into).collect();
        self
    }

    /// Directories searched, in order
    fn search_places(&self) -> Vec<PathBuf> {
        let mut places = Vec::new();

        if let Some(command_path) = &self.command_path {
            if command_path != &self.model_path {
                let pretrained_path = command_path.join(PRETRAINED_SUBDIR);
                if pretrained_path.exists() {
                    info!("Appending path: {}", pretrained_path.display());
                    places.push(pretrained_path);
                } else if command_path.exists() {
                    places.push(command_path.clone());
                }
            }
        }

        places.push(self.model_path.clone());
        places
    }

    fn accepts(&self, path: &Path) -> bool {
        let full_path = path.to_string_lossy();
        if self
            .ext_blacklist
            .iter()
            .any(|suffix| full_path.ends_with(suffix.as_str()))
        {
            return false;
        }

        if !self.ext_filter.is_empty() {
            let extension = path
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default();
            if !self.ext_filter.iter().any(|e| *e == extension) {
                return false;
            }
        }

        true
    }
}

/// Finds model files on disk, falling back to a remote URL
#[derive(Clone)]
pub struct ModelLocator {
    fetcher: Arc<dyn UrlFetcher>,
}

impl ModelLocator {
    pub fn new(fetcher: Arc<dyn UrlFetcher>) -> Self {
        Self { fetcher }
    }

    /// Collect model candidates for `query`.
    ///
    /// Returns the partial result if anything goes wrong along the way.
    pub fn discover(&self, query: &ModelQuery) -> Vec<ModelCandidate> {
        let mut output = Vec::new();
        if let Err(e) = self.discover_into(query, &mut output) {
            warn!(
                "Model discovery in {} stopped early: {}",
                query.model_path.display(),
                e
            );
        }
        output
    }

    fn discover_into(&self, query: &ModelQuery, output: &mut Vec<ModelCandidate>) -> Result<()> {
        for place in query.search_places() {
            if place.exists() {
                scan_place(&place, query, output)?;
            }
        }

        let Some(url) = &query.model_url else {
            return Ok(());
        };
        if output.is_empty() {
            match &query.download_name {
                Some(name) => {
                    let path = self
                        .fetcher
                        .fetch(url, &query.model_path, true, Some(name.as_str()))?;
                    output.push(ModelCandidate::Local(path));
                }
                None => output.push(ModelCandidate::Remote(url.clone())),
            }
        }

        Ok(())
    }
}

fn scan_place(place: &Path, query: &ModelQuery, output: &mut Vec<ModelCandidate>) -> Result<()> {
    for entry in WalkDir::new(place)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if let Some(path) = err.path().filter(|p| is_broken_symlink(p)) {
                    warn!("Skipping broken symlink: {}", path.display());
                    continue;
                }
                return Err(std::io::Error::from(err).into());
            }
        };

        let full_path = entry.path();
        if entry.file_type().is_dir() {
            continue;
        }
        if is_broken_symlink(full_path) {
            warn!("Skipping broken symlink: {}", full_path.display());
            continue;
        }
        if !query.accepts(full_path) {
            continue;
        }

        let candidate = ModelCandidate::Local(full_path.to_path_buf());
        if !output.contains(&candidate) {
            output.push(candidate);
        }
    }
    Ok(())
}

/// Dot-files and dot-directories are never model candidates
fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn is_broken_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
        && !path.exists()
}

/// The part of `file` that names the model: the URL path for web
/// references, the string itself otherwise.
fn friendly_source(file: &str) -> String {
    if file.contains("http") {
        if let Ok(url) = Url::parse(file) {
            return url.path().to_string();
        }
    }
    file.to_string()
}

/// Model name derived from a path or URL: basename without its final extension.
pub fn friendly_name(file: &str) -> String {
    let source = friendly_source(file);
    let base = source.rsplit(&['/', '\\'][..]).next().unwrap_or_default();

    match base.rfind('.') {
        // leading dots are part of the name, as with hidden files
        Some(idx) if !base[..idx].trim_start_matches('.').is_empty() => base[..idx].to_string(),
        _ => base.to_string(),
    }
}
