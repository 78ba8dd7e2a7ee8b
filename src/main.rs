//! query-client - cache inspection CLI
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use query_client::cli::{Cli, Commands};
use query_client::config::ConfigManager;
use query_client::error::ClientResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ClientResult<()> {
    let cli = Cli::parse();

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("query_client=warn"),
        1 => EnvFilter::new("query_client=info"),
        _ => EnvFilter::new("query_client=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    // Completions don't need config loading
    if let Commands::Completions { shell } = cli.command {
        query_client::cli::commands::completions(shell);
        return Ok(());
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    debug!("Using config {}", config_manager.path().display());
    let config = config_manager.load().await?;

    match cli.command {
        Commands::Completions { .. } => unreachable!("Completions handled above"),
        Commands::Cache(args) => query_client::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            query_client::cli::commands::config(args, &config_manager, &config).await
        }
    }
}
