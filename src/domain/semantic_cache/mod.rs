//! Semantic cache domain models
//!
//! Embeddings are cached by exact (normalized) text. Search results are
//! cached by query vector and matched on similarity rather than key equality.

mod config;
mod entry;

pub use config::SemanticCacheConfig;
pub use entry::{EmbeddingCacheEntry, SearchResultCacheEntry};
