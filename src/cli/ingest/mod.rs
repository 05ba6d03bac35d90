//! Ingest command - embeds and upserts documents from a JSON file

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tracing::info;

use super::print_json;
use crate::infrastructure::services::IngestDocument;

/// Arguments for the ingest command
#[derive(Args, Clone)]
pub struct IngestArgs {
    /// JSON file holding an array of `{id, text, metadata?, namespace?}`
    pub file: PathBuf,

    /// Namespace for documents that do not name one
    #[arg(long)]
    pub namespace: Option<String>,
}

/// Ingest the documents and print the mutation report
pub async fn run(args: IngestArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;

    let documents = read_documents(&args.file, args.namespace.as_deref())?;
    info!("Ingesting {} documents from {}", documents.len(), args.file.display());

    let orchestrator = crate::create_orchestrator(&config).await?;
    let report = orchestrator.ingest_batch_and_invalidate(documents).await?;

    print_json(&report)
}

fn read_documents(path: &Path, namespace: Option<&str>) -> anyhow::Result<Vec<IngestDocument>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_documents(&data, namespace)
        .with_context(|| format!("Invalid document file {}", path.display()))
}

fn parse_documents(data: &str, namespace: Option<&str>) -> anyhow::Result<Vec<IngestDocument>> {
    let mut documents: Vec<IngestDocument> = serde_json::from_str(data)?;

    if let Some(namespace) = namespace {
        for document in documents.iter_mut().filter(|d| d.namespace.is_none()) {
            document.namespace = Some(namespace.to_string());
        }
    }

    Ok(documents)
}
