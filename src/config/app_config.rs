use serde::Deserialize;

use crate::domain::semantic_cache::SemanticCacheConfig;
use crate::infrastructure::cache::CacheServerConfig;
use crate::infrastructure::embedding::{DEFAULT_EMBEDDING_MODEL, DEFAULT_OPENAI_BASE_URL};
use crate::infrastructure::observability::MetricsConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub semantic_cache: SemanticCacheConfig,
    #[serde(default)]
    pub cache_server: CacheServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub vector_search: VectorSearchSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Embedding provider connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Falls back to `OPENAI_API_KEY` when unset
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Requested (and expected) vector length
    pub dimensions: Option<usize>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorSearchBackend {
    /// In-process brute-force index
    #[default]
    Memory,
    Pinecone,
}

/// Vector index connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorSearchSettings {
    pub backend: VectorSearchBackend,
    /// Pinecone index host
    pub host: Option<String>,
    /// Falls back to `PINECONE_API_KEY` when unset
    pub api_key: Option<String>,
    pub default_namespace: Option<String>,
    pub upsert_batch_size: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            dimensions: None,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingSettings {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

impl Default for VectorSearchSettings {
    fn default() -> Self {
        Self {
            backend: VectorSearchBackend::Memory,
            host: None,
            api_key: None,
            default_namespace: None,
            upsert_batch_size: 100,
            timeout_secs: 30,
        }
    }
}

impl VectorSearchSettings {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("PINECONE_API_KEY").ok())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Loads `config/default`, `config/local` and `APP__*` environment
    /// variables, in increasing precedence, then validates the result
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |message: String| Err(config::ConfigError::Message(message));

        let threshold = self.semantic_cache.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return invalid(format!(
                "semantic_cache.similarity_threshold must be within [0, 1], got {}",
                threshold
            ));
        }

        if self.semantic_cache.embedding_ttl_secs == 0 || self.semantic_cache.search_ttl_secs == 0 {
            return invalid("semantic_cache TTLs must be greater than zero".to_string());
        }

        if let Err(e) = self.cache_server.validate() {
            return invalid(e.to_string());
        }

        if self.vector_search.upsert_batch_size == 0 {
            return invalid("vector_search.upsert_batch_size must be greater than zero".to_string());
        }

        if self.vector_search.backend == VectorSearchBackend::Pinecone {
            if self.vector_search.host.as_deref().is_none_or(str::is_empty) {
                return invalid("vector_search.host is required for the pinecone backend".to_string());
            }

            if self.vector_search.resolved_api_key().is_none() {
                return invalid(
                    "vector_search.api_key is required for the pinecone backend".to_string(),
                );
            }
        }

        Ok(())
    }
}
