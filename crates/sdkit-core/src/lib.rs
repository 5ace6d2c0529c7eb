//! sdkit core - model housekeeping and text conditioning glue for an
//! image-generation application.
//!
//! # Overview
//!
//! - [`model`]: best-effort discovery of model files on disk with a remote
//!   fallback, and one-time migration of legacy model locations into the
//!   per-category layout under the models root.
//! - [`upscaler`]: explicit registry of upscaler backends and the sorted list
//!   of scaler entries they contribute.
//! - [`tokenizer`]: OpenCLIP tokenizer adapter producing token ids and
//!   initial embedding vectors.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sdkit_core::{HttpFetcher, ModelLocator, ModelQuery};
//!
//! let locator = ModelLocator::new(Arc::new(HttpFetcher::new()?));
//! let models = locator.discover(
//!     &ModelQuery::new("models/ESRGAN").ext_filter([".pt", ".pth"]),
//! );
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod model;
pub mod tokenizer;
pub mod upscaler;

pub use config::{AppConfig, CommandLineOptions, TextOptions};
pub use device::{DeviceKind, DeviceProfile, DeviceSelector};
pub use error::{Error, Result};
pub use model::{
    friendly_name, migrate_legacy_layout, move_files, HttpFetcher, ModelCandidate, ModelLocator,
    ModelQuery, MoveReport, UrlFetcher,
};
pub use tokenizer::{
    ensure_emphasis_compatible, ConditioningModel, EmbeddingTable, OpenClipEmbedder,
    OpenClipVocab, SpecialTokens,
};
pub use upscaler::{Upscaler, UpscalerData, UpscalerInit, UpscalerRegistry};
