mod cli;
mod commands;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;

use chronicle_core::config::load_dotenv;
use chronicle_core::Config;
use chronicle_storage::Store;

use crate::cli::{CliArgs, Command};
use crate::config::CliConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let mut config = Config::from_env();
    if let Some(db) = &args.db {
        config.storage.database_path = db.clone();
    }
    config.log_summary();

    let cli_config = CliConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;

    let store = Store::open(&config.storage).await.with_context(|| {
        format!(
            "failed to open database {}",
            config.storage.database_path.display()
        )
    })?;

    let outcome = match &args.command {
        Command::Fetch(fetch) => commands::fetch(&store, &config, &cli_config, fetch)
            .await
            .map(|summary| summary.is_success()),
        Command::Query(query) => commands::query(&store, query).await.map(|_| true),
        Command::Status => commands::status(&store, &cli_config).await.map(|_| true),
        Command::Prune { days } => commands::prune(&store, &config, *days).await.map(|_| true),
        Command::Reset { source } => commands::reset(&store, source).await.map(|_| true),
    };
    store.close().await;

    Ok(if outcome? {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
