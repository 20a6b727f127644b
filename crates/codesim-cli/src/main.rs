//! `codesim`: k-fold soft-voting inference over a code-pair test set.
//!
//! # Usage
//! ```bash
//! codesim --model-dir checkpoints/codebert --base-model models/codebert-base \
//!     --data-dir data --output-dir results --fold-size 5
//! codesim --config codesim.toml --cpu
//! ```
//!
//! Flags override `CODESIM_*` environment variables, which override the
//! TOML file, which overrides built-in defaults.
//!
//! Exit codes: 0 on success, 1 on any error.

use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::Device;
use clap::Parser;
use codesim_inference::InferenceConfig;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

/// CLI arguments. Every flag is optional so that unset flags leave the
/// lower configuration layers alone.
#[derive(Parser, Debug, Default)]
#[command(name = "codesim")]
#[command(about = "Score code pairs with a k-fold twin-encoder ensemble and write a submission")]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding fold0..fold{N-1}.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Base model directory with config.json and tokenizer.json.
    #[arg(long)]
    base_model: Option<PathBuf>,

    /// Directory holding test.csv and sample_submission.csv.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Output directory (created if missing).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output file name inside the output directory.
    #[arg(long)]
    output_file: Option<String>,

    /// Maximum tokens per snippet.
    #[arg(long)]
    max_length: Option<usize>,

    /// Pairs per forward pass.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Tokenization worker threads.
    #[arg(long)]
    workers: Option<usize>,

    /// Number of fold checkpoints to ensemble.
    #[arg(long)]
    fold_size: Option<usize>,

    /// Identifier column in test.csv.
    #[arg(long)]
    id_column: Option<String>,

    /// Tokenize code as-is, without normalization.
    #[arg(long)]
    no_preprocess: bool,

    /// Run on CPU even if CUDA is available.
    #[arg(long)]
    cpu: bool,

    /// Device RNG seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Apply set flags on top of `config`.
    fn apply(self, mut config: InferenceConfig) -> InferenceConfig {
        if let Some(dir) = self.model_dir {
            config.paths.model_dir = dir;
        }
        if let Some(dir) = self.base_model {
            config.paths.base_model = dir;
        }
        if let Some(dir) = self.data_dir {
            config.paths.data_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.paths.output_dir = dir;
        }
        if let Some(file) = self.output_file {
            config.paths.output_file = file;
        }
        if let Some(n) = self.max_length {
            config.data.max_length = n;
        }
        if let Some(n) = self.batch_size {
            config.data.batch_size = n;
        }
        if let Some(n) = self.workers {
            config.data.workers = n;
        }
        if let Some(n) = self.fold_size {
            config.ensemble.fold_size = n;
        }
        if let Some(column) = self.id_column {
            config.data.id_column = column;
        }
        if self.no_preprocess {
            config.data.preprocess = false;
        }
        if self.cpu {
            config.runtime.cpu = true;
        }
        if let Some(seed) = self.seed {
            config.runtime.seed = seed;
        }
        if let Some(level) = self.log_level {
            config.runtime.log_level = level;
        }
        config
    }
}

/// Log error and print to stderr, returning exit code 1.
fn fail(context: &str, err: impl std::fmt::Display) -> i32 {
    error!("{}: {}", context, err);
    eprintln!("Error: {}: {}", context, err);
    1
}

/// Defaults, then TOML, then environment, then flags.
fn load_config(args: Args) -> Result<InferenceConfig> {
    let base = match &args.config {
        Some(path) => InferenceConfig::from_file(path)?,
        None => InferenceConfig::default(),
    };
    let config = args.apply(base.with_env_overrides()?);
    config.validate()?;
    Ok(config)
}

fn select_device(cpu: bool, seed: u64) -> Result<Device> {
    if cpu {
        debug!("CPU forced; device RNG left unseeded");
        return Ok(Device::Cpu);
    }

    let device = Device::cuda_if_available(0).context("Failed to probe CUDA device")?;
    if device.is_cuda() {
        device.set_seed(seed).context("Failed to seed CUDA RNG")?;
        info!(seed, "CUDA device acquired");
    } else {
        info!("CUDA unavailable; running on CPU");
    }
    Ok(device)
}

fn run(config: &InferenceConfig) -> Result<()> {
    let device = select_device(config.runtime.cpu, config.runtime.seed)?;
    let summary = codesim_inference::run(config, &device).context("Inference run failed")?;

    println!(
        "Wrote {} rows ({} similar) from {} folds to {}",
        summary.predictions.len(),
        summary.positives(),
        summary.folds,
        summary.output_path.display()
    );
    if let Some(m) = summary.metrics {
        println!(
            "accuracy={:.4} precision={:.4} recall={:.4} f1={:.4}",
            m.accuracy, m.precision, m.recall, m.f1
        );
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => std::process::exit(fail("Invalid configuration", format!("{:#}", e))),
    };

    // validate() already checked the level.
    let log_level = config.runtime.log_level().unwrap_or(tracing::Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to install log subscriber: {}", e);
    }

    debug!(?config, "Configuration resolved");

    let code = match run(&config) {
        Ok(()) => 0,
        Err(e) => fail("codesim", format!("{:#}", e)),
    };
    std::process::exit(code);
}
