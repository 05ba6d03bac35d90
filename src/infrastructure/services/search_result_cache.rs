//! Semantic search-result cache keyed on query-vector similarity

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::invalidation::InvalidationCoordinator;
use crate::domain::cache::{CacheKeys, CacheStore, CacheStoreExt, SimilarityQuery};
use crate::domain::semantic_cache::{SearchResultCacheEntry, SemanticCacheConfig};
use crate::domain::vector_search::SearchMatch;
use crate::domain::DomainError;
use crate::infrastructure::observability::{record_cache_lookup, CacheTier, LookupOutcome};

/// Similar entries examined per lookup
const SEARCH_CANDIDATES: usize = 4;

/// Where a search result came from
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CacheSource {
    /// Served from a cached entry whose query vector had this similarity
    Hit { similarity: f32 },
    /// Computed by the vector index
    Miss,
}

impl CacheSource {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheSource::Hit { .. })
    }
}

/// Ranked results plus their provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedSearch {
    pub matches: Vec<SearchMatch>,
    pub source: CacheSource,
}

/// Reuses a cached result list when a previous query vector is at least
/// `threshold` similar and asked for at least as many results
#[derive(Debug, Clone)]
pub struct SearchResultCache {
    store: Arc<dyn CacheStore>,
    coordinator: InvalidationCoordinator,
    threshold: f32,
    ttl: Duration,
    enabled: bool,
}

impl SearchResultCache {
    pub fn new(store: Arc<dyn CacheStore>, coordinator: InvalidationCoordinator) -> Self {
        Self::with_config(store, coordinator, &SemanticCacheConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn CacheStore>,
        coordinator: InvalidationCoordinator,
        config: &SemanticCacheConfig,
    ) -> Self {
        Self {
            store,
            coordinator,
            threshold: config.similarity_threshold.clamp(0.0, 1.0),
            ttl: config.search_ttl(),
            enabled: config.enabled,
        }
    }

    /// Configured similarity threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Looks up the default namespace. `threshold` overrides the configured
    /// value for this call.
    pub async fn get_or_compute<'a, F, Fut>(
        &self,
        query_vector: &'a [f32],
        top_k: usize,
        compute: F,
        threshold: Option<f32>,
    ) -> Result<CachedSearch, DomainError>
    where
        F: FnOnce(&'a [f32], usize) -> Fut,
        Fut: Future<Output = Result<Vec<SearchMatch>, DomainError>>,
    {
        self.get_or_compute_in(None, query_vector, top_k, compute, threshold)
            .await
    }

    /// Like [`get_or_compute`](Self::get_or_compute) within a namespace.
    /// Entries of other namespaces never satisfy the lookup.
    #[instrument(skip(self, query_vector, compute), fields(dims = query_vector.len()))]
    pub async fn get_or_compute_in<'a, F, Fut>(
        &self,
        namespace: Option<&str>,
        query_vector: &'a [f32],
        top_k: usize,
        compute: F,
        threshold: Option<f32>,
    ) -> Result<CachedSearch, DomainError>
    where
        F: FnOnce(&'a [f32], usize) -> Fut,
        Fut: Future<Output = Result<Vec<SearchMatch>, DomainError>>,
    {
        if top_k == 0 {
            return Err(DomainError::validation("top_k must be greater than zero"));
        }

        if query_vector.is_empty() {
            return Err(DomainError::validation("query vector must not be empty"));
        }

        let threshold = threshold.map_or(self.threshold, |t| t.clamp(0.0, 1.0));

        let lookup = self.lookup(namespace, query_vector, top_k, threshold).await;
        if let Some(hit) = lookup.hit {
            return Ok(hit);
        }

        let epoch = self.snapshot_epoch().await;
        let matches = compute(query_vector, top_k).await?;

        let entry_id = Uuid::new_v4().to_string();
        let entry = SearchResultCacheEntry::from_matches(
            &entry_id,
            namespace.map(str::to_string),
            query_vector.to_vec(),
            top_k,
            &matches,
        );

        if let Some(epoch) = epoch {
            self.store_entry(namespace, &entry, epoch, &lookup.superseded)
                .await;
        }

        Ok(CachedSearch {
            matches: entry.matches(top_k),
            source: CacheSource::Miss,
        })
    }

    async fn lookup(
        &self,
        namespace: Option<&str>,
        query_vector: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Lookup {
        if !self.enabled {
            return Lookup::default();
        }

        match self.find_best(namespace, query_vector, top_k, threshold).await {
            Ok(lookup) => {
                let outcome = if lookup.hit.is_some() {
                    LookupOutcome::Hit
                } else {
                    LookupOutcome::Miss
                };
                record_cache_lookup(CacheTier::Search, outcome);
                lookup
            }
            Err(e) => {
                warn!("Search cache lookup failed, querying index: {}", e);
                record_cache_lookup(CacheTier::Search, LookupOutcome::Error);
                Lookup::default()
            }
        }
    }

    /// Serves the most similar candidate that holds enough results. Similar
    /// candidates with too few results are reported as superseded.
    async fn find_best(
        &self,
        namespace: Option<&str>,
        query_vector: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Lookup, DomainError> {
        let scope = CacheKeys::search_scope(namespace);
        let query = SimilarityQuery::new(query_vector, threshold, SEARCH_CANDIDATES)
            .with_key_prefix(&scope);

        let candidates = self.store.find_similar(&query).await?;
        if candidates.is_empty() {
            debug!("Search cache miss: no similar query");
        }

        let mut lookup = Lookup::default();

        for candidate in candidates {
            let entry = match self.store.get::<SearchResultCacheEntry>(&candidate.key).await {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e @ DomainError::InvalidEntry { .. }) => {
                    self.discard(&candidate.key, &e).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Err(e) = entry.validate(&candidate.key) {
                self.discard(&candidate.key, &e).await;
                continue;
            }

            if !entry.can_serve(top_k, namespace) {
                debug!(
                    cached_top_k = entry.top_k(),
                    requested_top_k = top_k,
                    "Similar search entry holds too few results"
                );
                lookup.superseded.push(candidate.key);
                continue;
            }

            debug!(similarity = candidate.similarity, key = %candidate.key, "Search cache hit");

            lookup.hit = Some(CachedSearch {
                matches: entry.matches(top_k),
                source: CacheSource::Hit {
                    similarity: candidate.similarity,
                },
            });
            break;
        }

        Ok(lookup)
    }

    /// Reads the invalidation epoch before querying the index. `None` means
    /// the result must not be cached.
    async fn snapshot_epoch(&self) -> Option<u64> {
        if !self.enabled {
            return None;
        }

        match self.coordinator.epoch().await {
            Ok(epoch) => Some(epoch),
            Err(e) => {
                warn!("Not caching search results, invalidation epoch unavailable: {}", e);
                None
            }
        }
    }

    async fn discard(&self, key: &str, reason: &DomainError) {
        warn!("Discarding search cache entry: {}", reason);

        if let Err(e) = self.store.delete(key).await {
            warn!("Failed to delete invalid search entry: {}", e);
        }
    }

    /// Registers the entry in the reverse index, stores it, then drops it
    /// again if one of its documents changed after `epoch`. An entry that
    /// could not be registered is not stored. Once stored, the superseded
    /// entries are removed.
    async fn store_entry(
        &self,
        namespace: Option<&str>,
        entry: &SearchResultCacheEntry,
        epoch: u64,
        superseded: &[String],
    ) {
        if entry.document_id_set().is_empty() {
            debug!("Not caching empty search results");
            return;
        }

        let key = CacheKeys::search_entry(namespace, entry.id());

        if let Err(e) = self
            .coordinator
            .register(&key, entry.document_id_set(), self.ttl)
            .await
        {
            warn!("Not caching search results, reverse index unavailable: {}", e);
            return;
        }

        if let Err(e) = self
            .store
            .set_with_vector(&key, entry, entry.query_vector(), self.ttl)
            .await
        {
            warn!("Failed to store search results: {}", e);
            return;
        }

        match self
            .coordinator
            .changed_since(entry.document_id_set(), epoch)
            .await
        {
            Ok(false) => {}
            Ok(true) => {
                debug!("Documents changed during search, dropping cached results");
                self.remove(&key).await;
                return;
            }
            Err(e) => {
                warn!("Could not confirm cached search results are current: {}", e);
                self.remove(&key).await;
                return;
            }
        }

        for superseded_key in superseded {
            self.remove(superseded_key).await;
        }
    }

    async fn remove(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!("Failed to delete search entry {}: {}", key, e);
        }
    }
}

/// What a cache lookup found
#[derive(Debug, Default)]
struct Lookup {
    hit: Option<CachedSearch>,
    /// Similar entries that asked for fewer results than this request
    superseded: Vec<String>,
}
