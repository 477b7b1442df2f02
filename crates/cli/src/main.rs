//! apitest CLI - Main Entry Point
//!
//! Runs fixture-driven golden-file tests against an HTTP API and the
//! database behind it.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

mod commands;
mod output;

use apitest_runner::RunnerConfig;
use commands::{init, plan, run, spec};

/// apitest - Golden-file tests for database-backed HTTP APIs
#[derive(Parser)]
#[command(name = "apitest")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Runner configuration file
    #[arg(short, long, default_value = "apitest.toml", env = "APITEST_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scenarios and verify them against golden files
    Run(run::RunArgs),

    /// Show what a run would do with each fixture
    Plan,

    /// Render specification documents without running anything
    Spec,

    /// Write a default configuration file
    InitConfig(init::InitConfigArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Before parsing, so `.env` can supply APITEST_CONFIG
    let dotenv = load_env_file(Path::new(".env"));
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match dotenv {
        Some(Ok(())) => info!("Loaded environment variables from .env file"),
        Some(Err(e)) => warn!("Ignoring .env file: {}", e),
        None => {}
    }

    match dispatch(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}

/// Variables already set in the environment win over the file.
/// `None` when there is no file to load.
fn load_env_file(path: &Path) -> Option<Result<(), dotenvy::Error>> {
    if !path.exists() {
        return None;
    }
    Some(dotenvy::from_path(path))
}

/// `Ok(false)` means the command ran but something it checked failed
async fn dispatch(cli: Cli) -> anyhow::Result<bool> {
    let format = cli.format;
    let config_path = cli.config;

    match cli.command {
        Commands::InitConfig(args) => init::execute(args, &config_path),
        Commands::Run(args) => {
            let config = RunnerConfig::load(&config_path)?;
            run::execute(args, config, format).await
        }
        Commands::Plan => plan::execute(&RunnerConfig::load(&config_path)?, format),
        Commands::Spec => spec::execute(&RunnerConfig::load(&config_path)?),
    }
}
