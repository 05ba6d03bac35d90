use clap::Parser;
use semantic_search_cache::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Search(args) => cli::search::run(args).await,
        Command::Ingest(args) => cli::ingest::run(args).await,
        Command::Invalidate(args) => cli::invalidate::run(args).await,
        Command::Delete(args) => cli::invalidate::run_delete(args).await,
    }
}
