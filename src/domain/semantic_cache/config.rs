//! Semantic cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the embedding and search-result cache tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheConfig {
    /// Whether caching is enabled. When disabled every lookup is a miss
    /// and nothing is stored.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Similarity threshold for search cache hits (0.0 to 1.0)
    /// Higher values reduce incorrect reuse but lower the hit rate
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Time-to-live for cached embeddings in seconds
    #[serde(default = "default_embedding_ttl_secs")]
    pub embedding_ttl_secs: u64,

    /// Time-to-live for cached search results in seconds. Also bounds how
    /// long a newly created document can be missing from cached results.
    #[serde(default = "default_search_ttl_secs")]
    pub search_ttl_secs: u64,

    /// Lowercase text before hashing it into an embedding key
    #[serde(default = "default_true")]
    pub case_fold: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_similarity_threshold() -> f32 {
    0.9
}

fn default_embedding_ttl_secs() -> u64 {
    86_400
}

fn default_search_ttl_secs() -> u64 {
    3_600
}

fn default_true() -> bool {
    true
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            similarity_threshold: default_similarity_threshold(),
            embedding_ttl_secs: default_embedding_ttl_secs(),
            search_ttl_secs: default_search_ttl_secs(),
            case_fold: default_true(),
        }
    }
}

impl SemanticCacheConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the embedding TTL as Duration
    pub fn embedding_ttl(&self) -> Duration {
        Duration::from_secs(self.embedding_ttl_secs)
    }

    /// Get the search-result TTL as Duration
    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }

    /// Set whether caching is enabled
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the similarity threshold
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the embedding TTL
    pub fn with_embedding_ttl(mut self, ttl: Duration) -> Self {
        self.embedding_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the search-result TTL
    pub fn with_search_ttl(mut self, ttl: Duration) -> Self {
        self.search_ttl_secs = ttl.as_secs();
        self
    }

    /// Set whether to case-fold text before hashing
    pub fn with_case_fold(mut self, case_fold: bool) -> Self {
        self.case_fold = case_fold;
        self
    }
}
