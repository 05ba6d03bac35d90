//! Domain layer - Core caching models and collaborator contracts

pub mod cache;
pub mod embedding;
pub mod error;
pub mod semantic_cache;
pub mod vector_search;

pub use cache::{CacheKeys, CacheStore, CacheStoreExt, SimilarKey, SimilarityQuery, TextNormalizer};
pub use embedding::{cosine_similarity, similarity_score, EmbeddingProvider};
pub use error::DomainError;
pub use semantic_cache::{EmbeddingCacheEntry, SearchResultCacheEntry, SemanticCacheConfig};
pub use vector_search::{SearchMatch, VectorDocument, VectorSearchService};
