//! Cache store trait definition

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::DomainError;

/// A stored key whose indexed vector matched a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarKey {
    pub key: String,
    pub similarity: f32,
}

impl SimilarKey {
    pub fn new(key: impl Into<String>, similarity: f32) -> Self {
        Self {
            key: key.into(),
            similarity,
        }
    }
}

/// Parameters for a nearest-neighbour lookup over indexed vectors
#[derive(Debug, Clone)]
pub struct SimilarityQuery<'a> {
    /// Vector to compare against
    pub vector: &'a [f32],
    /// Minimum similarity (inclusive) in [0, 1]
    pub threshold: f32,
    /// Maximum number of keys to return
    pub limit: usize,
    /// Only consider keys starting with this prefix
    pub key_prefix: Option<&'a str>,
}

impl<'a> SimilarityQuery<'a> {
    pub fn new(vector: &'a [f32], threshold: f32, limit: usize) -> Self {
        Self {
            vector,
            threshold,
            limit,
            key_prefix: None,
        }
    }

    pub fn with_key_prefix(mut self, prefix: &'a str) -> Self {
        self.key_prefix = Some(prefix);
        self
    }

    /// Whether a key falls inside this query's prefix scope
    pub fn accepts_key(&self, key: &str) -> bool {
        self.key_prefix.is_none_or(|prefix| key.starts_with(prefix))
    }
}

/// Client abstraction over the remote key/value and similarity-search store
///
/// Every operation fails with [`DomainError::CacheUnavailable`] when the
/// server cannot be reached in time. Implementations never retry.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Gets a raw JSON value
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Sets a raw JSON value with a TTL, replacing any previous value
    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError>;

    /// Sets a raw JSON value and indexes `vector` for similarity lookups
    async fn set_vector(
        &self,
        key: &str,
        value: &str,
        vector: &[f32],
        ttl: Duration,
    ) -> Result<(), DomainError>;

    /// Deletes a value (and its indexed vector). Returns false if absent.
    async fn delete(&self, key: &str) -> Result<bool, DomainError>;

    /// Updates the TTL for an existing key
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DomainError>;

    /// Finds indexed keys whose vector similarity is at least the threshold,
    /// sorted by descending similarity
    async fn find_similar(
        &self,
        query: &SimilarityQuery<'_>,
    ) -> Result<Vec<SimilarKey>, DomainError>;

    /// Adds a member to a set, refreshing the set's TTL
    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration)
        -> Result<(), DomainError>;

    /// Reads all members of a set and removes the set
    async fn take_set(&self, key: &str) -> Result<Vec<String>, DomainError>;

    /// Atomically increments an integer counter, starting from 0, and
    /// returns the new value. Counters have no TTL.
    async fn increment(&self, key: &str) -> Result<u64, DomainError>;
}

/// Extension trait providing typed get/set operations
pub trait CacheStoreExt: CacheStore {
    /// Gets a typed value. A value that does not decode is an `InvalidEntry`.
    fn get<'a, V>(
        &'a self,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<V>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            match self.get_raw(key).await? {
                Some(data) => {
                    let value: V = serde_json::from_str(&data)
                        .map_err(|e| DomainError::invalid_entry(key, e.to_string()))?;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        }
    }

    /// Sets a typed value with a TTL
    fn set<'a, V>(
        &'a self,
        key: &'a str,
        value: &'a V,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let data = serde_json::to_string(value).map_err(|e| {
                DomainError::internal(format!("Failed to serialize cache value: {}", e))
            })?;
            self.set_raw(key, &data, ttl).await
        }
    }

    /// Sets a typed value and indexes its vector
    fn set_with_vector<'a, V>(
        &'a self,
        key: &'a str,
        value: &'a V,
        vector: &'a [f32],
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let data = serde_json::to_string(value).map_err(|e| {
                DomainError::internal(format!("Failed to serialize cache value: {}", e))
            })?;
            self.set_vector(key, &data, vector, ttl).await
        }
    }
}

// Blanket implementation for all types implementing CacheStore
impl<T: CacheStore + ?Sized> CacheStoreExt for T {}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_query_prefix_scope() {
        let vector = [1.0, 0.0];
        let query = SimilarityQuery::new(&vector, 0.9, 1).with_key_prefix("search:blogs:");

        assert!(query.accepts_key("search:blogs:123"));
        assert!(!query.accepts_key("search:products:123"));
    }

    #[test]
    fn test_similarity_query_without_prefix_accepts_all() {
        let vector = [1.0];
        let query = SimilarityQuery::new(&vector, 0.5, 3);

        assert!(query.accepts_key("anything"));
        assert_eq!(query.limit, 3);
    }

    #[tokio::test]
    async fn test_unavailable_store_typed_get() {
        let store = mock::UnavailableCacheStore;
        let result: Result<Option<String>, _> = store.get("key").await;

        assert!(matches!(result, Err(DomainError::CacheUnavailable { .. })));
    }
}
