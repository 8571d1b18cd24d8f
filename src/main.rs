//! orca - OCI artifact replication
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use orca::cli::{commands, Cli, Commands};
use orca::config::{ConfigManager, LogFormat};
use orca::error::OrcaResult;
use std::process::ExitCode;
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

async fn run() -> OrcaResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("orca=warn"),
        1 => EnvFilter::new("orca=info"),
        _ => EnvFilter::new("orca=debug"),
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match config.general.log_format {
        LogFormat::Text => subscriber.without_time().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    match cli.command {
        Commands::Copy(args) => commands::copy(args, &config).await,
        Commands::Push(args) => commands::push(args, &config).await,
        Commands::Pull(args) => commands::pull(args, &config).await,
        Commands::Tag(args) => commands::tag(args, &config).await,
        Commands::Discover(args) => commands::discover(args, &config).await,
        Commands::Delete(args) => commands::delete(args, &config).await,
        Commands::Backup(args) => commands::backup(args, &config).await,
        Commands::Restore(args) => commands::restore(args, &config).await,
        Commands::Config(args) => commands::config(args, &config_manager, &config).await,
        Commands::Cache(args) => commands::cache(args, &config).await,
    }
}
