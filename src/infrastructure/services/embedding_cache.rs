//! Exact-match embedding cache keyed on normalized text

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, instrument, warn};

use crate::domain::cache::{CacheKeys, CacheStore, CacheStoreExt, TextNormalizer};
use crate::domain::semantic_cache::{EmbeddingCacheEntry, SemanticCacheConfig};
use crate::domain::DomainError;
use crate::infrastructure::observability::{record_cache_lookup, CacheTier, LookupOutcome};

/// Text to vector cache in front of the embedding provider
///
/// Cache failures are always recovered as misses. Errors from the compute
/// function propagate unchanged and are never cached.
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    store: Arc<dyn CacheStore>,
    normalizer: TextNormalizer,
    model: String,
    ttl: Duration,
    dimensions: Option<usize>,
    enabled: bool,
}

impl EmbeddingCache {
    pub fn new(store: Arc<dyn CacheStore>, model: impl Into<String>) -> Self {
        Self::with_config(store, model, &SemanticCacheConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn CacheStore>,
        model: impl Into<String>,
        config: &SemanticCacheConfig,
    ) -> Self {
        Self {
            store,
            normalizer: TextNormalizer::new(config.case_fold),
            model: model.into(),
            ttl: config.embedding_ttl(),
            dimensions: None,
            enabled: config.enabled,
        }
    }

    /// Treat stored vectors of any other length as invalid
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Cache key for a text under this cache's model
    pub fn key_for(&self, text: &str) -> String {
        CacheKeys::embedding(&self.model, &self.normalizer.hash(text))
    }

    /// Returns the cached vector for `text`, or computes, stores and
    /// returns it
    #[instrument(skip(self, text, compute), fields(model = %self.model))]
    pub async fn get_or_compute<'a, F, Fut>(
        &self,
        text: &'a str,
        compute: F,
    ) -> Result<Vec<f32>, DomainError>
    where
        F: FnOnce(&'a str) -> Fut,
        Fut: Future<Output = Result<Vec<f32>, DomainError>>,
    {
        let hash = self.normalizer.hash(text);
        let key = CacheKeys::embedding(&self.model, &hash);

        if let Some(vector) = self.lookup(&key, &hash).await {
            return Ok(vector);
        }

        let vector = compute(text).await?;
        self.store_vector(&key, hash, &vector).await;

        Ok(vector)
    }

    /// Batch form of [`get_or_compute`](Self::get_or_compute). The batch
    /// function is called at most once, with only the missing texts in
    /// input order, and must return one vector per text it was given.
    #[instrument(skip_all, fields(model = %self.model, count = texts.len()))]
    pub async fn get_many_or_compute<F, Fut>(
        &self,
        texts: &[String],
        compute_batch: F,
    ) -> Result<Vec<Vec<f32>>, DomainError>
    where
        F: FnOnce(Vec<String>) -> Fut,
        Fut: Future<Output = Result<Vec<Vec<f32>>, DomainError>>,
    {
        let keyed: Vec<(String, String)> = texts
            .iter()
            .map(|text| {
                let hash = self.normalizer.hash(text);
                (CacheKeys::embedding(&self.model, &hash), hash)
            })
            .collect();

        let cached = join_all(keyed.iter().map(|(key, hash)| self.lookup(key, hash))).await;

        let missing: Vec<usize> = cached
            .iter()
            .enumerate()
            .filter(|(_, vector)| vector.is_none())
            .map(|(index, _)| index)
            .collect();

        let mut results = cached;

        if missing.is_empty() {
            return Ok(results.into_iter().flatten().collect());
        }

        debug!(hits = texts.len() - missing.len(), misses = missing.len(), "Batch lookup");

        let missing_texts = missing.iter().map(|&i| texts[i].clone()).collect();
        let computed = compute_batch(missing_texts).await?;

        if computed.len() != missing.len() {
            return Err(DomainError::internal(format!(
                "Batch embedding returned {} vectors for {} texts",
                computed.len(),
                missing.len()
            )));
        }

        for (index, vector) in missing.into_iter().zip(computed) {
            let (key, hash) = &keyed[index];
            self.store_vector(key, hash.clone(), &vector).await;
            results[index] = Some(vector);
        }

        Ok(results.into_iter().flatten().collect())
    }

    async fn lookup(&self, key: &str, hash: &str) -> Option<Vec<f32>> {
        if !self.enabled {
            return None;
        }

        let result = self
            .store
            .get::<EmbeddingCacheEntry>(key)
            .await
            .and_then(|entry| match entry {
                Some(entry) => entry.validate(key, hash, self.dimensions).map(|_| Some(entry)),
                None => Ok(None),
            });

        match result {
            Ok(Some(entry)) => {
                debug!(key = %key, "Embedding cache hit");
                record_cache_lookup(CacheTier::Embedding, LookupOutcome::Hit);
                Some(entry.into_vector())
            }
            Ok(None) => {
                debug!(key = %key, "Embedding cache miss");
                record_cache_lookup(CacheTier::Embedding, LookupOutcome::Miss);
                None
            }
            Err(e @ DomainError::InvalidEntry { .. }) => {
                warn!("Discarding embedding cache entry: {}", e);
                record_cache_lookup(CacheTier::Embedding, LookupOutcome::Error);
                if let Err(e) = self.store.delete(key).await {
                    warn!("Failed to delete invalid embedding entry: {}", e);
                }
                None
            }
            Err(e) => {
                warn!("Embedding cache lookup failed, computing: {}", e);
                record_cache_lookup(CacheTier::Embedding, LookupOutcome::Error);
                None
            }
        }
    }

    async fn store_vector(&self, key: &str, hash: String, vector: &[f32]) {
        if !self.enabled {
            return;
        }

        let entry = EmbeddingCacheEntry::new(hash, &self.model, vector.to_vec());

        if let Err(e) = entry.validate(key, entry.source_text_hash(), self.dimensions) {
            warn!("Not caching embedding: {}", e);
            return;
        }

        if let Err(e) = self.store.set(key, &entry, self.ttl).await {
            warn!("Failed to store embedding: {}", e);
        }
    }
}
