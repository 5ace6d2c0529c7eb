//! Subcommand implementations

use anyhow::Context;
use candle_core::DType;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use sdkit_core::model::ModelCandidate;
use sdkit_core::tokenizer::OpenClipVocab;
use sdkit_core::{
    friendly_name, migrate_legacy_layout, AppConfig, CommandLineOptions, DeviceSelector,
    EmbeddingTable, HttpFetcher, ModelLocator, ModelQuery, OpenClipEmbedder, UpscalerRegistry,
};

use crate::{Cli, OutputFormat};

pub struct DiscoverArgs {
    pub model_path: PathBuf,
    pub command_path: Option<PathBuf>,
    pub ext_filter: Vec<String>,
    pub ext_blacklist: Vec<String>,
    pub url: Option<String>,
    pub download_name: Option<String>,
}

pub struct EmbedInitArgs {
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
    pub key: String,
    pub num_vectors: usize,
    pub text: String,
}

/// Configuration file (if any) with command line overrides applied
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.script_path = root.clone();
    }
    if let Some(models_dir) = &cli.models_dir {
        config.models_path = Some(models_dir.clone());
    }
    if let Some(device) = &cli.device {
        config.device = Some(device.clone());
    }
    Ok(config)
}

fn locator() -> anyhow::Result<ModelLocator> {
    let fetcher = HttpFetcher::new().context("failed to set up downloader")?;
    Ok(ModelLocator::new(Arc::new(fetcher)))
}

fn candidate_json(candidate: &ModelCandidate) -> serde_json::Value {
    json!({
        "path": candidate.to_string(),
        "name": candidate.friendly_name(),
        "extension": candidate.extension(),
        "remote": candidate.is_remote(),
    })
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

pub fn discover(args: DiscoverArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut query = ModelQuery::new(args.model_path)
        .command_path(args.command_path)
        .ext_filter(args.ext_filter)
        .ext_blacklist(args.ext_blacklist);
    if let Some(url) = args.url {
        query = query.model_url(url);
    }
    if let Some(name) = args.download_name {
        query = query.download_name(name);
    }

    let found = locator()?.discover(&query);
    match format {
        OutputFormat::Plain => found.iter().for_each(|c| println!("{}", c)),
        OutputFormat::Json => print_json(&json!(found
            .iter()
            .map(candidate_json)
            .collect::<Vec<_>>())),
    }
    Ok(())
}

pub fn friendly_names(inputs: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Plain => inputs.iter().for_each(|i| println!("{}", friendly_name(i))),
        OutputFormat::Json => print_json(&json!(inputs
            .iter()
            .map(|i| json!({ "input": i, "name": friendly_name(i) }))
            .collect::<Vec<_>>())),
    }
}

pub fn migrate(config: &AppConfig, format: OutputFormat) {
    let models_path = config.models_path();
    info!(
        "Migrating legacy models from {} into {}",
        config.script_path.display(),
        models_path.display()
    );

    let reports = migrate_legacy_layout(&config.script_path, &models_path);
    let moved: Vec<&PathBuf> = reports.iter().flat_map(|r| r.moved.iter()).collect();
    match format {
        OutputFormat::Plain => {
            moved.iter().for_each(|p| println!("{}", p.display()));
            println!("{} files moved", moved.len());
        }
        OutputFormat::Json => print_json(&json!({
            "moved": moved.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            "removed_sources": reports.iter().filter(|r| r.removed_source).count(),
        })),
    }
}

pub fn upscalers(
    config: &AppConfig,
    overrides: Vec<(String, PathBuf)>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let options: CommandLineOptions = config
        .upscaler_paths
        .iter()
        .map(|(key, path)| (key.to_string(), path.to_path_buf()))
        .chain(overrides)
        .collect();

    let locator = locator()?;
    let mut registry = UpscalerRegistry::with_builtins();
    registry.list_builtin_upscalers(&config.models_path(), &options, &locator);

    let scalers = registry.scalers();
    match format {
        OutputFormat::Plain => scalers.iter().for_each(|s| println!("{}", s)),
        OutputFormat::Json => print_json(&json!(scalers
            .iter()
            .map(|s| json!({
                "name": s.name,
                "scale": s.scale,
                "model": s.data_path.as_ref().map(ToString::to_string),
                "backend": s.backend().map(|b| b.type_name.clone()),
            }))
            .collect::<Vec<_>>())),
    }
    Ok(())
}

fn load_vocab(path: &Path) -> anyhow::Result<OpenClipVocab> {
    OpenClipVocab::from_file(path)
        .with_context(|| format!("failed to load tokenizer {}", path.display()))
}

pub fn tokenize(
    config: &AppConfig,
    tokenizer: &Path,
    texts: &[String],
    format: OutputFormat,
) -> anyhow::Result<()> {
    let vocab = load_vocab(tokenizer)?;
    let tokens = vocab.tokenize(texts, &config.text)?;

    match format {
        OutputFormat::Plain => {
            for ids in &tokens {
                let ids: Vec<String> = ids.iter().map(u32::to_string).collect();
                println!("{}", ids.join(" "));
            }
        }
        OutputFormat::Json => print_json(&json!({
            "special_tokens": {
                "comma": vocab.special_tokens().comma_id,
                "start": vocab.special_tokens().start_id,
                "end": vocab.special_tokens().end_id,
                "pad": vocab.special_tokens().pad_id,
            },
            "tokens": tokens,
        })),
    }
    Ok(())
}

pub fn embed_init(
    config: &AppConfig,
    args: EmbedInitArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let profile = DeviceSelector::detect_with_preference(config.device.as_deref());
    let vocab = load_vocab(&args.tokenizer)?;
    let table = EmbeddingTable::from_safetensors(&args.weights, &args.key, &profile.device)
        .with_context(|| format!("failed to load {}", args.weights.display()))?;

    let embedder = OpenClipEmbedder::new(vocab, table, profile.device, config.text.clone());
    let vectors = embedder
        .encode_embedding_init_text(&args.text, args.num_vectors)?
        .to_dtype(DType::F32)?
        .to_vec2::<f32>()?;

    match format {
        OutputFormat::Plain => {
            for row in &vectors {
                let row: Vec<String> = row.iter().map(|v| format!("{:.6}", v)).collect();
                println!("{}", row.join(" "));
            }
        }
        OutputFormat::Json => print_json(&json!(vectors)),
    }
    Ok(())
}
