//! Vacpipe Ingest - pipeline entry point
//!
//! Intended to be triggered once daily by an external scheduler; retries on
//! failure are the scheduler's responsibility, so the process simply exits
//! non-zero when the run fails.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use vacpipe_common::logging::{init_logging, LogConfig, LogLevel};
use vacpipe_ingest::fetch::ScrollFetcher;
use vacpipe_ingest::sinks::MultiSinkWriter;
use vacpipe_ingest::{Config, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "vacpipe-ingest")]
#[command(author, version, about = "Covid vaccination data ingestion pipeline")]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Write this run's category mapping artifact as JSON
    #[arg(long)]
    mappings_out: Option<PathBuf>,

    /// Safety cap on scroll pages; truncates the snapshot, testing aid only
    #[arg(long)]
    max_pages: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables override individual fields when set
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("vacpipe-ingest".to_string())
        .build()
        .merge_env()?;

    init_logging(&log_config)?;

    let mut config = Config::load()?;
    if cli.max_pages.is_some() {
        config.api.max_pages = cli.max_pages;
    }

    let fetcher = ScrollFetcher::new(&config.api)?;
    let writer = MultiSinkWriter::connect(&config).await?;
    let pipeline = Pipeline::new(fetcher, writer);

    let summary = pipeline.run().await?;

    if let Some(path) = cli.mappings_out {
        let json = serde_json::to_string_pretty(&summary.mappings)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write mappings to {}", path.display()))?;
        info!(path = %path.display(), "category mappings exported");
    }

    info!(records = summary.written, "ingestion complete");
    Ok(())
}
