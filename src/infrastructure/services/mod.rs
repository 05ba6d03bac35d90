//! Infrastructure services - the cache tiers and their orchestration

mod embedding_cache;
mod invalidation;
mod orchestrator;
mod search_result_cache;

pub use embedding_cache::EmbeddingCache;
pub use invalidation::{InvalidationCoordinator, InvalidationReport};
pub use orchestrator::{CacheOrchestrator, IngestDocument, MutationReport, SearchOutcome};
pub use search_result_cache::{CacheSource, CachedSearch, SearchResultCache};
