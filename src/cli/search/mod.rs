//! Search command - embeds a query and searches through the cache

use clap::Args;
use tracing::info;

use super::print_json;

/// Arguments for the search command
#[derive(Args, Clone)]
pub struct SearchArgs {
    /// Query text
    pub text: String,

    /// Number of results to return
    #[arg(long, default_value_t = 5)]
    pub top_k: usize,

    /// Vector index namespace (defaults to vector_search.default_namespace)
    #[arg(long)]
    pub namespace: Option<String>,
}

/// Run a cached search and print the outcome as JSON
pub async fn run(args: SearchArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let orchestrator = crate::create_orchestrator(&config).await?;

    let outcome = orchestrator
        .embed_and_search_in(&args.text, args.top_k, args.namespace.as_deref())
        .await?;

    info!(
        results = outcome.matches.len(),
        hit = outcome.source.is_hit(),
        "Search complete"
    );

    print_json(&outcome)
}
