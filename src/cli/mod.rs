//! CLI module for the semantic search cache
//!
//! Provides subcommands that exercise the cache against the configured
//! backends:
//! - `search`: embed a query and return nearest documents
//! - `ingest`: embed and upsert documents, invalidating cached searches
//! - `invalidate`: evict cached searches for changed documents
//! - `delete`: remove documents from the index and invalidate

pub mod ingest;
pub mod invalidate;
pub mod search;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::observability::init_metrics;

/// Semantic Search Cache - embedding and search-result caching
#[derive(Parser)]
#[command(name = "semantic-search-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Embed a query and search the vector index through the cache
    Search(search::SearchArgs),

    /// Ingest documents from a JSON file and invalidate affected searches
    Ingest(ingest::IngestArgs),

    /// Evict cached searches that reference the given documents
    Invalidate(invalidate::InvalidateArgs),

    /// Delete documents from the vector index and invalidate
    Delete(invalidate::DeleteArgs),
}

/// Loads `.env` and configuration, then starts logging and metrics
pub fn bootstrap() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_logging(&config.logging);
    init_metrics(&config.metrics)?;

    Ok(config)
}

/// Pretty-prints a value as JSON on stdout
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
