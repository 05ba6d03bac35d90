//! Invalidate and delete commands

use clap::Args;

use super::print_json;
use crate::infrastructure::services::InvalidationCoordinator;

/// Arguments for the invalidate command
#[derive(Args, Clone)]
pub struct InvalidateArgs {
    /// Changed document ids
    #[arg(required = true)]
    pub ids: Vec<String>,
}

/// Arguments for the delete command
#[derive(Args, Clone)]
pub struct DeleteArgs {
    /// Document ids to remove
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Vector index namespace (defaults to vector_search.default_namespace)
    #[arg(long)]
    pub namespace: Option<String>,
}

/// Evict cached searches for the documents. Only the cache server is
/// contacted.
pub async fn run(args: InvalidateArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let store = crate::create_cache_store(&config).await?;

    let report = InvalidationCoordinator::new(store)
        .on_batch_changed(&args.ids)
        .await?;

    crate::infrastructure::observability::record_invalidation(report.entries_evicted);

    print_json(&report)
}

/// Delete the documents from the index, then invalidate
pub async fn run_delete(args: DeleteArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let orchestrator = crate::create_orchestrator(&config).await?;

    let report = orchestrator
        .delete_and_invalidate(&args.ids, args.namespace.as_deref())
        .await?;

    print_json(&report)
}
