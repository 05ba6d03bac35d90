//! Cache orchestrator - composes the cache tiers around the upstreams

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::embedding_cache::EmbeddingCache;
use super::invalidation::{InvalidationCoordinator, InvalidationReport};
use super::search_result_cache::{CacheSource, SearchResultCache};
use crate::domain::cache::CacheStore;
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::semantic_cache::SemanticCacheConfig;
use crate::domain::vector_search::{SearchMatch, VectorDocument, VectorSearchService};
use crate::domain::DomainError;
use crate::infrastructure::observability::{record_invalidation, record_upstream};

const DEFAULT_UPSERT_BATCH_SIZE: usize = 100;

/// A document to embed and write to the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDocument {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl IngestDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: serde_json::Map::new(),
            namespace: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Result of `embed_and_search`
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub namespace: Option<String>,
    pub matches: Vec<SearchMatch>,
    pub source: CacheSource,
}

/// Result of a mutation of the vector index
#[derive(Debug, Clone, Default, Serialize)]
pub struct MutationReport {
    /// Documents written to or removed from the index
    pub documents: usize,
    /// `None` when the cache could not be invalidated; cached searches may
    /// then be stale until they expire
    pub invalidation: Option<InvalidationReport>,
}

/// Entry points used by the rest of the system
///
/// Cache failures never fail a call. Upstream failures always do.
#[derive(Debug)]
pub struct CacheOrchestrator {
    embedding_cache: EmbeddingCache,
    search_cache: SearchResultCache,
    coordinator: InvalidationCoordinator,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_search: Arc<dyn VectorSearchService>,
    default_namespace: Option<String>,
    upsert_batch_size: usize,
}

impl CacheOrchestrator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_search: Arc<dyn VectorSearchService>,
        model: impl Into<String>,
        config: &SemanticCacheConfig,
    ) -> Self {
        let coordinator =
            InvalidationCoordinator::new(store.clone()).with_marker_ttl(config.search_ttl());

        Self {
            embedding_cache: EmbeddingCache::with_config(store.clone(), model, config),
            search_cache: SearchResultCache::with_config(store, coordinator.clone(), config),
            coordinator,
            embedding_provider,
            vector_search,
            default_namespace: None,
            upsert_batch_size: DEFAULT_UPSERT_BATCH_SIZE,
        }
    }

    /// Expected embedding dimensionality; cached vectors of another length
    /// are discarded
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_cache = self.embedding_cache.with_dimensions(dimensions);
        self
    }

    /// Namespace used when a call does not name one
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.default_namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    pub fn with_upsert_batch_size(mut self, size: usize) -> Self {
        self.upsert_batch_size = size.max(1);
        self
    }

    pub fn embedding_cache(&self) -> &EmbeddingCache {
        &self.embedding_cache
    }

    pub fn search_cache(&self) -> &SearchResultCache {
        &self.search_cache
    }

    /// Embeds `text` and returns the `top_k` nearest documents in the
    /// default namespace
    pub async fn embed_and_search(
        &self,
        text: &str,
        top_k: usize,
    ) -> Result<SearchOutcome, DomainError> {
        self.embed_and_search_in(text, top_k, None).await
    }

    #[instrument(skip(self, text), fields(namespace = ?namespace))]
    pub async fn embed_and_search_in(
        &self,
        text: &str,
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<SearchOutcome, DomainError> {
        if text.trim().is_empty() {
            return Err(DomainError::validation("query text must not be empty"));
        }

        if top_k == 0 {
            return Err(DomainError::validation("top_k must be greater than zero"));
        }

        let namespace = self.resolve_namespace(namespace);

        let vector = self
            .embedding_cache
            .get_or_compute(text, |text| {
                timed(
                    self.embedding_provider.provider_name(),
                    self.embedding_provider.embed(text),
                )
            })
            .await?;

        let search = self
            .search_cache
            .get_or_compute_in(
                namespace,
                &vector,
                top_k,
                |vector, top_k| {
                    timed(
                        self.vector_search.service_name(),
                        self.vector_search.search(vector, top_k, namespace),
                    )
                },
                None,
            )
            .await?;

        Ok(SearchOutcome {
            namespace: namespace.map(str::to_string),
            matches: search.matches,
            source: search.source,
        })
    }

    /// Embeds and upserts one document, then evicts every cached search
    /// that contains it before returning
    #[instrument(skip(self, document), fields(document_id = %document.id))]
    pub async fn ingest_and_invalidate(
        &self,
        document: IngestDocument,
    ) -> Result<MutationReport, DomainError> {
        validate_document(&document)?;

        let vector = self
            .embedding_cache
            .get_or_compute(&document.text, |text| {
                timed(
                    self.embedding_provider.provider_name(),
                    self.embedding_provider.embed(text),
                )
            })
            .await?;

        let namespace = self.resolve_namespace(document.namespace.as_deref());
        let ids = vec![document.id.clone()];
        let payload = VectorDocument::new(document.id, vector).with_metadata(document.metadata);

        let upserted = timed(
            self.vector_search.service_name(),
            self.vector_search.upsert(std::slice::from_ref(&payload), namespace),
        )
        .await?;

        Ok(MutationReport {
            documents: upserted,
            invalidation: self.invalidate_after_mutation(&ids).await,
        })
    }

    /// Batch form of [`ingest_and_invalidate`](Self::ingest_and_invalidate).
    /// Embeddings are computed in one provider call for the uncached texts;
    /// upserts are chunked per namespace.
    #[instrument(skip_all, fields(count = documents.len()))]
    pub async fn ingest_batch_and_invalidate(
        &self,
        documents: Vec<IngestDocument>,
    ) -> Result<MutationReport, DomainError> {
        if documents.is_empty() {
            return Ok(MutationReport {
                documents: 0,
                invalidation: Some(InvalidationReport::default()),
            });
        }

        for document in &documents {
            validate_document(document)?;
        }

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = self
            .embedding_cache
            .get_many_or_compute(&texts, |missing| async move {
                timed(
                    self.embedding_provider.provider_name(),
                    self.embedding_provider.embed_batch(&missing),
                )
                .await
            })
            .await?;

        let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();

        let mut by_namespace: BTreeMap<Option<String>, Vec<VectorDocument>> = BTreeMap::new();
        for (document, vector) in documents.into_iter().zip(vectors) {
            let namespace = self
                .resolve_namespace(document.namespace.as_deref())
                .map(str::to_string);

            by_namespace
                .entry(namespace)
                .or_default()
                .push(VectorDocument::new(document.id, vector).with_metadata(document.metadata));
        }

        let mut upserted = 0;
        for (namespace, payloads) in &by_namespace {
            for chunk in payloads.chunks(self.upsert_batch_size) {
                upserted += timed(
                    self.vector_search.service_name(),
                    self.vector_search.upsert(chunk, namespace.as_deref()),
                )
                .await?;
            }
        }

        info!(upserted, "Ingested documents");

        Ok(MutationReport {
            documents: upserted,
            invalidation: self.invalidate_after_mutation(&ids).await,
        })
    }

    /// Removes documents from the index, then evicts cached searches that
    /// contain them
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn delete_and_invalidate(
        &self,
        ids: &[String],
        namespace: Option<&str>,
    ) -> Result<MutationReport, DomainError> {
        if ids.is_empty() {
            return Ok(MutationReport {
                documents: 0,
                invalidation: Some(InvalidationReport::default()),
            });
        }

        let namespace = self.resolve_namespace(namespace);

        timed(
            self.vector_search.service_name(),
            self.vector_search.delete(ids, namespace),
        )
        .await?;

        Ok(MutationReport {
            documents: ids.len(),
            invalidation: self.invalidate_after_mutation(ids).await,
        })
    }

    /// Evicts cached searches for documents changed outside this process.
    /// Unlike the mutating entry points, cache failures are returned.
    pub async fn invalidate(&self, ids: &[String]) -> Result<InvalidationReport, DomainError> {
        let report = self.coordinator.on_batch_changed(ids).await?;
        record_invalidation(report.entries_evicted);
        Ok(report)
    }

    async fn invalidate_after_mutation(&self, ids: &[String]) -> Option<InvalidationReport> {
        match self.invalidate(ids).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(
                    "Cache invalidation failed; cached searches may be stale until they expire: {}",
                    e
                );
                None
            }
        }
    }

    fn resolve_namespace<'a>(&'a self, namespace: Option<&'a str>) -> Option<&'a str> {
        namespace
            .filter(|ns| !ns.is_empty())
            .or(self.default_namespace.as_deref())
    }
}

fn validate_document(document: &IngestDocument) -> Result<(), DomainError> {
    if document.id.trim().is_empty() {
        return Err(DomainError::validation("document id must not be empty"));
    }

    if document.text.trim().is_empty() {
        return Err(DomainError::validation(format!(
            "document '{}' has no text",
            document.id
        )));
    }

    Ok(())
}

/// Awaits an upstream call and records its latency
async fn timed<T, Fut>(service: &'static str, future: Fut) -> Result<T, DomainError>
where
    Fut: Future<Output = Result<T, DomainError>>,
{
    let start = Instant::now();
    let result = future.await;
    record_upstream(service, start.elapsed(), result.is_ok());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::UnavailableCacheStore;
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::vector_search::MockVectorSearch;
    use crate::infrastructure::cache::InMemoryCacheStore;
    use crate::infrastructure::vector_search::InMemoryVectorSearch;

    const MODEL: &str = "text-embedding-3-large";

    fn five_matches() -> Vec<SearchMatch> {
        (1..=5)
            .map(|i| SearchMatch::new(format!("d{}", i), 1.0 - i as f32 * 0.05))
            .collect()
    }

    fn embedding_provider(times: usize) -> MockEmbeddingProvider {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed()
            .times(times)
            .returning(|_| Ok(vec![1.0, 0.0]));
        provider.expect_provider_name().return_const("mock-embedder");
        provider
    }

    fn orchestrator(
        store: Arc<dyn CacheStore>,
        provider: MockEmbeddingProvider,
        index: Arc<dyn VectorSearchService>,
    ) -> CacheOrchestrator {
        CacheOrchestrator::new(
            store,
            Arc::new(provider),
            index,
            MODEL,
            &SemanticCacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_repeated_search_hits_both_tiers() {
        let index = Arc::new(MockVectorSearch::new().with_matches(five_matches()));
        let orchestrator = orchestrator(
            Arc::new(InMemoryCacheStore::new()),
            embedding_provider(1),
            index.clone(),
        );

        let first = orchestrator.embed_and_search("hello world", 5).await.unwrap();
        let second = orchestrator.embed_and_search("Hello  World", 3).await.unwrap();

        assert_eq!(first.source, CacheSource::Miss);
        assert!(second.source.is_hit());
        assert_eq!(second.matches, first.matches[..3].to_vec());
        assert_eq!(index.search_calls(), 1);
    }

    #[tokio::test]
    async fn test_read_after_write_never_serves_invalidated_entry() {
        let index = Arc::new(MockVectorSearch::new().with_matches(five_matches()));
        let orchestrator = orchestrator(
            Arc::new(InMemoryCacheStore::new()),
            embedding_provider(2),
            index.clone(),
        );

        orchestrator.embed_and_search("query", 5).await.unwrap();

        let report = orchestrator
            .ingest_and_invalidate(IngestDocument::new("d2", "updated text"))
            .await
            .unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.invalidation.unwrap().entries_evicted, 1);

        let after = orchestrator.embed_and_search("query", 5).await.unwrap();
        assert_eq!(after.source, CacheSource::Miss);
        assert_eq!(index.search_calls(), 2);
        assert_eq!(index.upserted(), vec!["d2"]);
    }

    #[tokio::test]
    async fn test_delete_evicts_cached_search() {
        let index = Arc::new(MockVectorSearch::new().with_matches(five_matches()));
        let orchestrator = orchestrator(
            Arc::new(InMemoryCacheStore::new()),
            embedding_provider(1),
            index.clone(),
        );

        orchestrator.embed_and_search("query", 5).await.unwrap();
        let report = orchestrator
            .delete_and_invalidate(&["d2".to_string()], None)
            .await
            .unwrap();

        assert_eq!(report.invalidation.unwrap().entries_evicted, 1);
        assert_eq!(index.deleted(), vec!["d2"]);

        let after = orchestrator.embed_and_search("query", 5).await.unwrap();
        assert_eq!(after.source, CacheSource::Miss);
    }

    #[tokio::test]
    async fn test_cache_down_gives_same_results() {
        let index = Arc::new(MockVectorSearch::new().with_matches(five_matches()));
        let orchestrator = orchestrator(
            Arc::new(UnavailableCacheStore),
            embedding_provider(2),
            index.clone(),
        );

        let first = orchestrator.embed_and_search("query", 3).await.unwrap();
        let second = orchestrator.embed_and_search("query", 3).await.unwrap();

        assert_eq!(first.matches, five_matches()[..3].to_vec());
        assert_eq!(second.matches, first.matches);
        assert_eq!(index.search_calls(), 2);
    }

    #[tokio::test]
    async fn test_mutation_succeeds_when_invalidation_unavailable() {
        let index = Arc::new(MockVectorSearch::new());
        let orchestrator = orchestrator(
            Arc::new(UnavailableCacheStore),
            embedding_provider(1),
            index.clone(),
        );

        let report = orchestrator
            .ingest_and_invalidate(IngestDocument::new("d1", "text"))
            .await
            .unwrap();

        assert_eq!(report.documents, 1);
        assert!(report.invalidation.is_none());

        let direct = orchestrator.invalidate(&["d1".to_string()]).await;
        assert!(matches!(direct, Err(DomainError::CacheUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_upstream_errors_propagate() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed()
            .times(1)
            .returning(|_| Err(DomainError::upstream("openai", "Rate limit exceeded")));
        provider.expect_provider_name().return_const("mock-embedder");

        let orchestrator = orchestrator(
            Arc::new(InMemoryCacheStore::new()),
            provider,
            Arc::new(MockVectorSearch::new()),
        );

        let result = orchestrator.embed_and_search("query", 5).await;
        assert!(matches!(result, Err(DomainError::UpstreamCompute { .. })));

        let failing_index = orchestrator_with_failing_index();
        let result = failing_index.embed_and_search("query", 5).await;
        assert!(matches!(result, Err(DomainError::UpstreamCompute { .. })));
    }

    fn orchestrator_with_failing_index() -> CacheOrchestrator {
        orchestrator(
            Arc::new(InMemoryCacheStore::new()),
            embedding_provider(1),
            Arc::new(MockVectorSearch::new().with_error("index down")),
        )
    }

    #[tokio::test]
    async fn test_validation() {
        let orchestrator = orchestrator(
            Arc::new(InMemoryCacheStore::new()),
            embedding_provider(0),
            Arc::new(MockVectorSearch::new()),
        );

        assert!(matches!(
            orchestrator.embed_and_search("   ", 5).await,
            Err(DomainError::Validation { .. })
        ));
        assert!(matches!(
            orchestrator.embed_and_search("query", 0).await,
            Err(DomainError::Validation { .. })
        ));
        assert!(matches!(
            orchestrator
                .ingest_and_invalidate(IngestDocument::new("", "text"))
                .await,
            Err(DomainError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_batch_ingest_chunks_and_invalidates() {
        let store: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
        let index = Arc::new(InMemoryVectorSearch::new());

        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed_batch()
            .times(1)
            .returning(|texts| {
                Ok(texts
                    .iter()
                    .enumerate()
                    .map(|(i, _)| vec![1.0, i as f32 * 0.01])
                    .collect())
            });
        provider
            .expect_embed()
            .times(1)
            .returning(|_| Ok(vec![1.0, 0.0]));
        provider.expect_provider_name().return_const("mock-embedder");

        let orchestrator = orchestrator(store, provider, index.clone()).with_upsert_batch_size(2);

        let documents: Vec<IngestDocument> = (0..5)
            .map(|i| IngestDocument::new(format!("d{}", i), format!("text {}", i)))
            .collect();
        let report = orchestrator
            .ingest_batch_and_invalidate(documents.clone())
            .await
            .unwrap();
        assert_eq!(report.documents, 5);
        assert_eq!(index.len(None).await, 5);

        let cached = orchestrator.embed_and_search("lookup", 3).await.unwrap();
        assert_eq!(cached.source, CacheSource::Miss);
        assert!(orchestrator.embed_and_search("lookup", 3).await.unwrap().source.is_hit());

        // Re-ingest: embeddings come from the cache; the cached search is evicted
        let report = orchestrator
            .ingest_batch_and_invalidate(documents)
            .await
            .unwrap();
        assert_eq!(report.invalidation.unwrap().entries_evicted, 1);
    }

    #[tokio::test]
    async fn test_default_namespace_applies() {
        let index = Arc::new(InMemoryVectorSearch::new());
        let orchestrator = orchestrator(
            Arc::new(InMemoryCacheStore::new()),
            embedding_provider(1),
            index.clone(),
        )
        .with_default_namespace("products");

        orchestrator
            .ingest_and_invalidate(IngestDocument::new("p1", "widget"))
            .await
            .unwrap();

        assert_eq!(index.len(Some("products")).await, 1);

        let outcome = orchestrator.embed_and_search("widget", 1).await.unwrap();
        assert_eq!(outcome.namespace.as_deref(), Some("products"));
        assert_eq!(outcome.matches[0].id, "p1");
    }
}
