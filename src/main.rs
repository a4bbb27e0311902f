//! ga4-extract - GA4 report extraction to delimited text files
//!
//! # Usage
//!
//! ```bash
//! # One property, settings from GA4_* variables (default)
//! GA4_PROPERTY_ID=123456 ga4-extract
//!
//! # Every brand x date range x report in a batch config
//! ga4-extract batch --config batch_config.toml
//!
//! # List the property ids the token can see
//! ga4-extract properties
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ga4_extract::batch::load_batch_config;
use ga4_extract::config::DEFAULT_BATCH_CONFIG;
use ga4_extract::error::{EXIT_CONFIG_ERROR, EXIT_NO_OUTPUT};
use ga4_extract::{ExtractError, Extractor, Settings, SingleRunSettings};

/// ga4-extract - GA4 report extraction to delimited text files
#[derive(Parser, Debug)]
#[command(name = "ga4-extract")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "GA4_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query one property and export one file
    Run,

    /// Run every brand x date range x report combination of a batch config
    Batch(BatchArgs),

    /// List accessible properties and export them
    Properties,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Path to the batch configuration (TOML, or JSON by extension)
    #[arg(short, long, env = "BATCH_CONFIG_PATH", default_value = DEFAULT_BATCH_CONFIG)]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("{}", e);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    let outcome = match cli.command {
        Some(Command::Batch(args)) => run_batch(args),
        Some(Command::Properties) => run_properties(),
        Some(Command::Run) | None => run_single(),
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn run_single() -> Result<u8, ExtractError> {
    let settings = Settings::from_env()?;
    let single = SingleRunSettings::from_env()?;

    let extractor = Extractor::builder().settings(settings).build()?;
    let path = extractor.run_single(&single)?;
    info!(path = %path.display(), "done");
    Ok(0)
}

fn run_batch(args: BatchArgs) -> Result<u8, ExtractError> {
    let settings = Settings::from_env()?;

    info!(path = %args.config.display(), "loading batch config");
    let config = load_batch_config(&args.config)?;
    info!(
        brands = config.brands.len(),
        date_ranges = config.date_ranges.len(),
        reports = config.reports.len(),
        "batch config loaded"
    );

    let extractor = Extractor::builder().settings(settings).build_for_batch(&config)?;
    let summary = extractor.run_batch(&config)?;

    if summary.is_success() {
        Ok(0)
    } else {
        error!(failed = summary.failed, "batch produced no output files");
        Ok(EXIT_NO_OUTPUT)
    }
}

fn run_properties() -> Result<u8, ExtractError> {
    let settings = Settings::from_env()?;
    let extractor = Extractor::builder().settings(settings).build()?;
    let (props, path) = extractor.list_properties()?;
    info!(total = props.len(), path = %path.display(), "properties saved");
    Ok(0)
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    Ok(())
}
