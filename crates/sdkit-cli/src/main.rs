//! sdkit CLI - model housekeeping for the image-generation stack
//!
//! Examples:
//!   sdkit discover models/ESRGAN --ext .pth --ext .pt
//!   sdkit migrate
//!   sdkit upscalers --set esrgan_models_path=/mnt/esrgan
//!   sdkit tokenize --tokenizer tokenizer.json "a photo of a cat"

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Model discovery, migration, upscaler listing and OpenCLIP tokenization
#[derive(Parser)]
#[command(
    name = "sdkit",
    version = env!("CARGO_PKG_VERSION"),
    arg_required_else_help = true,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Application root holding legacy model folders
    #[arg(long, global = true, value_name = "PATH", env = "SDKIT_ROOT")]
    pub root: Option<PathBuf>,

    /// Models root
    #[arg(long, global = true, value_name = "PATH", env = "SDKIT_MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    /// Compute device (cpu, cuda, metal)
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Output format
    #[arg(
        long = "output-format",
        global = true,
        value_enum,
        default_value = "plain"
    )]
    pub output_format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find model files in a directory
    #[command(name = "discover", alias = "find")]
    Discover {
        /// Directory to search and download into
        model_path: PathBuf,

        /// Directory searched before MODEL_PATH
        #[arg(long, value_name = "PATH")]
        command_path: Option<PathBuf>,

        /// Accepted extension, with leading dot (repeatable)
        #[arg(short, long = "ext", value_name = "EXT")]
        ext_filter: Vec<String>,

        /// Rejected path suffix (repeatable)
        #[arg(short = 'x', long = "exclude", value_name = "SUFFIX")]
        ext_blacklist: Vec<String>,

        /// Fallback URL when nothing is found locally
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Download the fallback URL immediately under this name
        #[arg(long, value_name = "NAME", requires = "url")]
        download_name: Option<String>,
    },

    /// Print the model name derived from paths or URLs
    #[command(name = "friendly-name")]
    FriendlyName {
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Move model files from legacy locations into the models root
    #[command(name = "migrate")]
    Migrate,

    /// List the scaler entries of all upscaler backends
    #[command(name = "upscalers", alias = "scalers")]
    Upscalers {
        /// Model directory override, e.g. esrgan_models_path=/mnt/esrgan
        #[arg(long = "set", value_name = "KEY=PATH", value_parser = parse_key_path)]
        overrides: Vec<(String, PathBuf)>,
    },

    /// Tokenize texts with an OpenCLIP vocabulary
    #[command(name = "tokenize")]
    Tokenize {
        /// tokenizer.json of the text encoder
        #[arg(long, value_name = "PATH")]
        tokenizer: PathBuf,

        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Embedding vectors for a textual-inversion initialization text
    #[command(name = "embed-init")]
    EmbedInit {
        /// tokenizer.json of the text encoder
        #[arg(long, value_name = "PATH")]
        tokenizer: PathBuf,

        /// safetensors file holding the token embedding table
        #[arg(long, value_name = "PATH")]
        weights: PathBuf,

        /// Tensor name of the embedding table
        #[arg(long, default_value = sdkit_core::tokenizer::TOKEN_EMBEDDING_KEY)]
        key: String,

        /// Vectors per token
        #[arg(short, long, default_value = "1")]
        num_vectors: usize,

        text: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// One item per line
    Plain,
    /// JSON output
    Json,
}

fn parse_key_path(raw: &str) -> Result<(String, PathBuf), String> {
    let (key, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=PATH, got '{}'", raw))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    Ok((key.trim().to_string(), PathBuf::from(path)))
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "sdkit=debug,sdkit_core=debug"
    } else {
        "sdkit=info,sdkit_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = commands::load_config(&cli)?;
    let format = cli.output_format;

    match cli.command {
        Commands::Discover {
            model_path,
            command_path,
            ext_filter,
            ext_blacklist,
            url,
            download_name,
        } => commands::discover(
            commands::DiscoverArgs {
                model_path,
                command_path,
                ext_filter,
                ext_blacklist,
                url,
                download_name,
            },
            format,
        )?,
        Commands::FriendlyName { inputs } => commands::friendly_names(&inputs, format),
        Commands::Migrate => commands::migrate(&config, format),
        Commands::Upscalers { overrides } => commands::upscalers(&config, overrides, format)?,
        Commands::Tokenize { tokenizer, texts } => {
            commands::tokenize(&config, &tokenizer, &texts, format)?
        }
        Commands::EmbedInit {
            tokenizer,
            weights,
            key,
            num_vectors,
            text,
        } => commands::embed_init(
            &config,
            commands::EmbedInitArgs {
                tokenizer,
                weights,
                key,
                num_vectors,
                text,
            },
            format,
        )?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_path_pairs_parse() {
        assert_eq!(
            parse_key_path("esrgan_models_path=/mnt/esrgan").unwrap(),
            ("esrgan_models_path".to_string(), PathBuf::from("/mnt/esrgan"))
        );
        assert!(parse_key_path("no-separator").is_err());
        assert!(parse_key_path("=/x").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn discover_arguments_parse() {
        let cli = Cli::try_parse_from([
            "sdkit",
            "discover",
            "models/ESRGAN",
            "--ext",
            ".pth",
            "-e",
            ".pt",
            "--exclude",
            ".vae.pt",
        ])
        .unwrap();
        match cli.command {
            Commands::Discover {
                model_path,
                ext_filter,
                ext_blacklist,
                ..
            } => {
                assert_eq!(model_path, PathBuf::from("models/ESRGAN"));
                assert_eq!(ext_filter, [".pth", ".pt"]);
                assert_eq!(ext_blacklist, [".vae.pt"]);
            }
            _ => panic!("expected discover"),
        }
    }
}
