//! Semantic Search Cache
//!
//! A caching layer in front of an embedding provider and a vector index:
//! - Exact-match caching of embeddings keyed on normalized text
//! - Semantic caching of search results keyed on query-vector similarity
//! - Targeted invalidation of cached results when documents change

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use config::VectorSearchBackend;
use domain::{CacheStore, EmbeddingProvider, VectorSearchService};
use infrastructure::cache::CacheStoreFactory;
use infrastructure::embedding::OpenAiEmbeddingProvider;
use infrastructure::http_client::HttpClient;
use infrastructure::services::CacheOrchestrator;
use infrastructure::vector_search::{InMemoryVectorSearch, PineconeVectorSearch};

/// Connects the configured cache backend
pub async fn create_cache_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    info!("Cache backend: {}", config.cache_server.backend);

    let store = CacheStoreFactory::new()
        .create(&config.cache_server)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create cache store: {}", e))?;

    Ok(store)
}

/// Builds the OpenAI embedding provider
pub fn create_embedding_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let settings = &config.embedding;

    let api_key = settings.resolved_api_key().ok_or_else(|| {
        anyhow::anyhow!("embedding.api_key (or OPENAI_API_KEY) is required")
    })?;

    let client = HttpClient::with_timeout("openai", Duration::from_secs(settings.timeout_secs))?;
    let mut provider = OpenAiEmbeddingProvider::with_base_url(client, api_key, &settings.base_url)
        .with_model(&settings.model);

    if let Some(dimensions) = settings.dimensions {
        provider = provider.with_dimensions(dimensions);
    }

    info!("Embedding model: {}", settings.model);

    Ok(Arc::new(provider))
}

/// Builds the configured vector index client
pub fn create_vector_search(config: &AppConfig) -> anyhow::Result<Arc<dyn VectorSearchService>> {
    let settings = &config.vector_search;

    match settings.backend {
        VectorSearchBackend::Memory => {
            info!("Vector search backend: in-memory");
            Ok(Arc::new(InMemoryVectorSearch::new()))
        }
        VectorSearchBackend::Pinecone => {
            let host = settings
                .host
                .clone()
                .ok_or_else(|| anyhow::anyhow!("vector_search.host is required for pinecone"))?;
            let api_key = settings.resolved_api_key().ok_or_else(|| {
                anyhow::anyhow!("vector_search.api_key (or PINECONE_API_KEY) is required")
            })?;

            let client =
                HttpClient::with_timeout("pinecone", Duration::from_secs(settings.timeout_secs))?;

            info!("Vector search backend: pinecone ({})", host);
            Ok(Arc::new(PineconeVectorSearch::new(client, host, api_key)))
        }
    }
}

/// Wires the orchestrator from configuration
pub async fn create_orchestrator(config: &AppConfig) -> anyhow::Result<CacheOrchestrator> {
    let store = create_cache_store(config).await?;
    let embedding_provider = create_embedding_provider(config)?;
    let vector_search = create_vector_search(config)?;

    let mut orchestrator = CacheOrchestrator::new(
        store,
        embedding_provider,
        vector_search,
        &config.embedding.model,
        &config.semantic_cache,
    )
    .with_upsert_batch_size(config.vector_search.upsert_batch_size);

    if let Some(dimensions) = config.embedding.dimensions {
        orchestrator = orchestrator.with_dimensions(dimensions);
    }

    if let Some(namespace) = &config.vector_search.default_namespace {
        orchestrator = orchestrator.with_default_namespace(namespace);
    }

    info!(
        threshold = orchestrator.search_cache().threshold(),
        "Semantic cache ready"
    );

    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_orchestrator_with_memory_backends() {
        let mut config = AppConfig::default();
        config.embedding.api_key = Some("test-key".to_string());
        config.vector_search.default_namespace = Some("products".to_string());

        let orchestrator = create_orchestrator(&config).await.unwrap();

        assert_eq!(orchestrator.embedding_cache().model(), "text-embedding-3-large");
        assert_eq!(orchestrator.search_cache().threshold(), 0.9);
    }

    #[test]
    fn test_pinecone_backend_requires_host() {
        let mut config = AppConfig::default();
        config.vector_search.backend = VectorSearchBackend::Pinecone;
        config.vector_search.api_key = Some("key".to_string());

        assert!(create_vector_search(&config).is_err());
    }
}
