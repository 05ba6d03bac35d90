//! In-memory cache store implementation using moka

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::Expiry;

use crate::domain::cache::{CacheStore, SimilarKey, SimilarityQuery};
use crate::domain::embedding::similarity_score;
use crate::domain::DomainError;

/// Configuration for the in-memory store
#[derive(Debug, Clone)]
pub struct InMemoryCacheStoreConfig {
    /// Maximum number of entries (values and sets)
    pub max_capacity: u64,
}

impl Default for InMemoryCacheStoreConfig {
    fn default() -> Self {
        Self {
            max_capacity: 100_000,
        }
    }
}

impl InMemoryCacheStoreConfig {
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Value {
        data: Arc<str>,
        vector: Option<Arc<[f32]>>,
    },
    Set(Arc<HashSet<String>>),
}

/// Entry stored in moka
#[derive(Debug, Clone)]
struct StoredEntry {
    payload: Payload,
    ttl: Duration,
    expires_at: Instant,
}

impl StoredEntry {
    fn new(payload: Payload, ttl: Duration) -> Self {
        Self {
            payload,
            ttl,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Lifetime given to counters, which have no TTL of their own
const COUNTER_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Per-entry TTL: creation and every overwrite restart the entry's clock
struct EntryExpiry;

impl Expiry<String, StoredEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Thread-safe in-memory store using moka
///
/// Similarity lookups are a brute-force scan over indexed vectors, which is
/// adequate for development and small caches.
#[derive(Debug, Clone)]
pub struct InMemoryCacheStore {
    cache: MokaCache<String, StoredEntry>,
}

impl InMemoryCacheStore {
    /// Creates a new in-memory store with default configuration
    pub fn new() -> Self {
        Self::with_config(InMemoryCacheStoreConfig::default())
    }

    /// Creates a new in-memory store with the given configuration
    pub fn with_config(config: InMemoryCacheStoreConfig) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self { cache }
    }

    async fn live_entry(&self, key: &str) -> Option<StoredEntry> {
        match self.cache.get(key).await {
            Some(entry) if entry.is_expired() => {
                self.cache.invalidate(key).await;
                None
            }
            other => other,
        }
    }

    fn value_entry(value: &str, vector: Option<&[f32]>, ttl: Duration) -> StoredEntry {
        StoredEntry::new(
            Payload::Value {
                data: Arc::from(value),
                vector: vector.map(Arc::from),
            },
            ttl,
        )
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        match self.live_entry(key).await {
            Some(StoredEntry {
                payload: Payload::Value { data, .. },
                ..
            }) => Ok(Some(data.to_string())),
            Some(_) => Err(DomainError::invalid_entry(key, "key holds a set")),
            None => Ok(None),
        }
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        self.cache
            .insert(key.to_string(), Self::value_entry(value, None, ttl))
            .await;
        Ok(())
    }

    async fn set_vector(
        &self,
        key: &str,
        value: &str,
        vector: &[f32],
        ttl: Duration,
    ) -> Result<(), DomainError> {
        self.cache
            .insert(key.to_string(), Self::value_entry(value, Some(vector), ttl))
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self
            .cache
            .remove(key)
            .await
            .is_some_and(|entry| !entry.is_expired()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DomainError> {
        match self.live_entry(key).await {
            Some(entry) => {
                let refreshed = StoredEntry::new(entry.payload, ttl);
                self.cache.insert(key.to_string(), refreshed).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_similar(
        &self,
        query: &SimilarityQuery<'_>,
    ) -> Result<Vec<SimilarKey>, DomainError> {
        let mut results: Vec<SimilarKey> = self
            .cache
            .iter()
            .filter(|(key, entry)| query.accepts_key(key.as_str()) && !entry.is_expired())
            .filter_map(|(key, entry)| match &entry.payload {
                Payload::Value {
                    vector: Some(vector),
                    ..
                } => Some(SimilarKey::new(
                    key.as_str(),
                    similarity_score(query.vector, vector),
                )),
                _ => None,
            })
            .filter(|result| result.similarity >= query.threshold)
            .collect();

        // Sort by similarity descending
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        results.truncate(query.limit);

        Ok(results)
    }

    async fn add_to_set(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), DomainError> {
        let member = member.to_string();

        self.cache
            .entry(key.to_string())
            .and_upsert_with(|existing| {
                let mut members = match existing.map(|entry| entry.into_value()) {
                    Some(StoredEntry {
                        payload: Payload::Set(set),
                        expires_at,
                        ..
                    }) if Instant::now() < expires_at => (*set).clone(),
                    _ => HashSet::new(),
                };
                members.insert(member);

                std::future::ready(StoredEntry::new(Payload::Set(Arc::new(members)), ttl))
            })
            .await;

        Ok(())
    }

    async fn take_set(&self, key: &str) -> Result<Vec<String>, DomainError> {
        match self.cache.remove(key).await {
            Some(entry) if entry.is_expired() => Ok(Vec::new()),
            Some(StoredEntry {
                payload: Payload::Set(set),
                ..
            }) => {
                let mut members: Vec<String> = set.iter().cloned().collect();
                members.sort();
                Ok(members)
            }
            Some(_) => Err(DomainError::invalid_entry(key, "key holds a plain value")),
            None => Ok(Vec::new()),
        }
    }

    async fn increment(&self, key: &str) -> Result<u64, DomainError> {
        let mut malformed = false;

        let entry = self
            .cache
            .entry(key.to_string())
            .and_upsert_with(|existing| {
                let next = match existing.map(|entry| entry.into_value()) {
                    Some(entry) if !entry.is_expired() => {
                        let current = match &entry.payload {
                            Payload::Value { data, .. } => data.parse::<u64>().ok(),
                            Payload::Set(_) => None,
                        };

                        match current {
                            Some(value) => Self::value_entry(
                                &value.saturating_add(1).to_string(),
                                None,
                                COUNTER_TTL,
                            ),
                            // Left in place
                            None => {
                                malformed = true;
                                entry
                            }
                        }
                    }
                    _ => Self::value_entry("1", None, COUNTER_TTL),
                };

                std::future::ready(next)
            })
            .await;

        if malformed {
            return Err(DomainError::invalid_entry(key, "key does not hold a counter"));
        }

        match entry.into_value().payload {
            Payload::Value { data, .. } => data
                .parse::<u64>()
                .map_err(|e| DomainError::internal(format!("Counter {} is corrupt: {}", key, e))),
            Payload::Set(_) => Err(DomainError::invalid_entry(key, "key holds a set")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::CacheStoreExt;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryCacheStore::new();
        store.set("key1", &"value1", TTL).await.unwrap();

        let result: Option<String> = store.get("key1").await.unwrap();
        assert_eq!(result, Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryCacheStore::new();

        let result: Option<String> = store.get("missing").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let store = InMemoryCacheStore::new();
        store.set("key", &1u32, TTL).await.unwrap();
        store.set("key", &2u32, TTL).await.unwrap();

        let result: Option<u32> = store.get("key").await.unwrap();
        assert_eq!(result, Some(2));
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let store = InMemoryCacheStore::new();
        store
            .set_raw("short", "\"v\"", Duration::from_millis(50))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(store.get_raw("short").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryCacheStore::new();
        store.set("key", &"v", TTL).await.unwrap();

        assert!(store.delete("key").await.unwrap());
        assert!(!store.delete("key").await.unwrap());
        assert!(store.get_raw("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expire_updates_ttl() {
        let store = InMemoryCacheStore::new();
        store.set("key", &"v", TTL).await.unwrap();

        assert!(store.expire("key", Duration::from_millis(30)).await.unwrap());
        assert!(!store.expire("missing", TTL).await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.get_raw("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_similar_orders_and_filters() {
        let store = InMemoryCacheStore::new();
        store.set_vector("a", "1", &[1.0, 0.0], TTL).await.unwrap();
        store.set_vector("b", "2", &[0.9, 0.1], TTL).await.unwrap();
        store.set_vector("c", "3", &[0.0, 1.0], TTL).await.unwrap();
        store.set_raw("plain", "4", TTL).await.unwrap();

        let query = [1.0, 0.0];
        let results = store
            .find_similar(&SimilarityQuery::new(&query, 0.9, 10))
            .await
            .unwrap();

        let keys: Vec<&str> = results.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[tokio::test]
    async fn test_find_similar_limit_and_prefix() {
        let store = InMemoryCacheStore::new();
        store.set_vector("x:1", "1", &[1.0, 0.0], TTL).await.unwrap();
        store.set_vector("y:1", "2", &[1.0, 0.0], TTL).await.unwrap();
        store.set_vector("x:2", "3", &[0.95, 0.05], TTL).await.unwrap();

        let query = [1.0, 0.0];
        let results = store
            .find_similar(&SimilarityQuery::new(&query, 0.5, 1).with_key_prefix("x:"))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "x:1");
    }

    #[tokio::test]
    async fn test_deleted_vector_not_found() {
        let store = InMemoryCacheStore::new();
        store.set_vector("a", "1", &[1.0, 0.0], TTL).await.unwrap();
        store.delete("a").await.unwrap();

        let query = [1.0, 0.0];
        let results = store
            .find_similar(&SimilarityQuery::new(&query, 0.1, 10))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_set_add_and_take() {
        let store = InMemoryCacheStore::new();
        store.add_to_set("s", "b", TTL).await.unwrap();
        store.add_to_set("s", "a", TTL).await.unwrap();
        store.add_to_set("s", "a", TTL).await.unwrap();

        assert_eq!(store.take_set("s").await.unwrap(), vec!["a", "b"]);
        assert!(store.take_set("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_increment_counts_from_zero() {
        let store = InMemoryCacheStore::new();

        assert_eq!(store.increment("counter").await.unwrap(), 1);
        assert_eq!(store.increment("counter").await.unwrap(), 2);
        assert_eq!(store.get_raw("counter").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_increment_rejects_non_counter() {
        let store = InMemoryCacheStore::new();
        store.set_raw("text", "\"hello\"", TTL).await.unwrap();

        assert!(matches!(
            store.increment("text").await,
            Err(DomainError::InvalidEntry { .. })
        ));
        assert_eq!(store.get_raw("text").await.unwrap().as_deref(), Some("\"hello\""));
    }

    #[tokio::test]
    async fn test_get_on_set_is_invalid_entry() {
        let store = InMemoryCacheStore::new();
        store.add_to_set("s", "a", TTL).await.unwrap();

        assert!(matches!(
            store.get_raw("s").await,
            Err(DomainError::InvalidEntry { .. })
        ));
    }
}
