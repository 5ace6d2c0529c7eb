//! Fetching remote model files into a local directory

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

/// Downloads a URL into a directory and returns the local file path.
pub trait UrlFetcher: Send + Sync {
    /// Fetch `url` into `dest_dir`.
    ///
    /// The file is stored as `file_name` when given, otherwise under the last
    /// segment of the URL path. An existing file at the destination is reused.
    fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: bool,
        file_name: Option<&str>,
    ) -> Result<PathBuf>;
}

/// HTTP implementation of [`UrlFetcher`]
pub struct HttpFetcher {
    http_client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(3600)) // checkpoints run to several GB
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    fn download_to(&self, url: &str, dest: &Path, progress: bool) -> Result<()> {
        debug!("Downloading from URL: {}", url);

        let mut response = self
            .http_client
            .get(url)
            .header("User-Agent", concat!("sdkit/", env!("CARGO_PKG_VERSION")))
            .send()
            .map_err(|e| Error::DownloadError(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }

        let pb = if progress {
            let pb = match response.content_length() {
                Some(len) => ProgressBar::new(len),
                None => ProgressBar::new_spinner(),
            };
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bytes}/{total_bytes} {msg}")
            {
                pb.set_style(style);
            }
            pb
        } else {
            ProgressBar::hidden()
        };
        pb.set_message(display_name(dest));

        let partial = dest.with_extension(match dest.extension() {
            Some(ext) => format!("{}.part", ext.to_string_lossy()),
            None => "part".to_string(),
        });

        let copied = {
            let file = BufWriter::new(File::create(&partial)?);
            let mut writer = pb.wrap_write(file);
            std::io::copy(&mut response, &mut writer)
                .and_then(|copied| writer.flush().map(|_| copied))
                .map_err(|e| Error::DownloadError(format!("Failed to read response: {}", e)))
        };

        let copied = match copied {
            Ok(copied) => copied,
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                pb.abandon();
                return Err(e);
            }
        };

        std::fs::rename(&partial, dest)?;
        pb.finish_and_clear();

        debug!("Downloaded {} bytes to {:?}", copied, dest);
        Ok(())
    }
}

impl UrlFetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: bool,
        file_name: Option<&str>,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(dest_dir)?;

        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => file_name_from_url(url)?,
        };
        let dest = dest_dir.join(&file_name);

        if dest.exists() {
            debug!("File already exists: {:?}", dest);
            return Ok(dest);
        }

        info!("Downloading: \"{}\" to {:?}", url, dest);
        self.download_to(url, &dest, progress)?;
        Ok(dest)
    }
}

/// Last non-empty segment of the URL path
pub fn file_name_from_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidUrl(format!("{} has no file name", url)))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
