//! Redis cache store implementation

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::cache::{CacheStore, SimilarKey, SimilarityQuery};
use crate::domain::embedding::similarity_score;
use crate::domain::DomainError;

/// Hash holding `key -> IndexedVector` for every similarity-indexed key
const VECTOR_INDEX_KEY: &str = "vindex";

/// Vector index field value. Carries the value key's expiry so that every
/// scan can drop fields whose key has expired, whatever their score.
#[derive(Debug, Serialize, Deserialize)]
struct IndexedVector {
    /// Unix time in milliseconds
    expires_at: i64,
    vector: Vec<f32>,
}

impl IndexedVector {
    fn new(vector: Vec<f32>, ttl_secs: u64) -> Self {
        let ttl_ms = i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);

        Self {
            expires_at: Utc::now().timestamp_millis().saturating_add(ttl_ms),
            vector,
        }
    }

    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    fn to_json(&self) -> Result<String, DomainError> {
        serde_json::to_string(self)
            .map_err(|e| DomainError::internal(format!("Failed to serialize vector: {}", e)))
    }
}

/// Configuration for the Redis store
#[derive(Debug, Clone)]
pub struct RedisCacheStoreConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: Option<String>,
    /// Bound on every individual command
    pub operation_timeout: Duration,
    /// Bound on establishing the initial connection
    pub connection_timeout: Duration,
}

impl Default for RedisCacheStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: None,
            operation_timeout: Duration::from_millis(150),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisCacheStoreConfig {
    /// Creates a new configuration with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Sets the per-command timeout
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// Inserts credentials into a `redis://` or `rediss://` URL that has none
pub fn connection_url(url: &str, username: Option<&str>, password: Option<&str>) -> String {
    let Some(password) = password else {
        return url.to_string();
    };

    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    if rest.contains('@') {
        return url.to_string();
    }

    format!(
        "{}://{}:{}@{}",
        scheme,
        username.unwrap_or_default(),
        password,
        rest
    )
}

/// Redis-backed cache store
///
/// - TTL support per entry via `SET .. EX`
/// - Similarity lookups scan a vector index hash; every scan prunes fields
///   whose value key has expired or been removed
/// - Concurrent use through a cloned `ConnectionManager` (multiplexed)
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
    config: RedisCacheStoreConfig,
}

impl fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCacheStore")
            .field("key_prefix", &self.config.key_prefix)
            .field("operation_timeout", &self.config.operation_timeout)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCacheStore {
    /// Connects to Redis
    pub async fn new(config: RedisCacheStoreConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            DomainError::configuration(format!("Failed to create Redis client: {}", e))
        })?;

        let connection = tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                DomainError::cache_unavailable(format!(
                    "Timed out connecting to Redis after {:?}",
                    config.connection_timeout
                ))
            })?
            .map_err(|e| DomainError::cache_unavailable(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { connection, config })
    }

    fn prefix_key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn strip_prefix<'a>(&self, key: &'a str) -> Option<&'a str> {
        match &self.config.key_prefix {
            Some(prefix) => key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix(':')),
            None => Some(key),
        }
    }

    fn index_key(&self) -> String {
        self.prefix_key(VECTOR_INDEX_KEY)
    }

    fn ttl_secs(ttl: Duration) -> u64 {
        ttl.as_secs().max(1)
    }

    /// Runs one round trip under the operation timeout
    async fn bounded<T, F>(&self, operation: &str, future: F) -> Result<T, DomainError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.operation_timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DomainError::cache_unavailable(format!(
                "{} failed: {}",
                operation, e
            ))),
            Err(_) => Err(DomainError::cache_unavailable(format!(
                "{} timed out after {:?}",
                operation, self.config.operation_timeout
            ))),
        }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        self.bounded("GET", conn.get::<_, Option<String>>(&prefixed_key))
            .await
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        self.bounded(
            "SET",
            conn.set_ex::<_, _, ()>(&prefixed_key, value, Self::ttl_secs(ttl)),
        )
        .await
    }

    async fn set_vector(
        &self,
        key: &str,
        value: &str,
        vector: &[f32],
        ttl: Duration,
    ) -> Result<(), DomainError> {
        let prefixed_key = self.prefix_key(key);
        let ttl_secs = Self::ttl_secs(ttl);
        let indexed = IndexedVector::new(vector.to_vec(), ttl_secs).to_json()?;
        let mut conn = self.connection.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(&prefixed_key, value, ttl_secs)
            .ignore()
            .hset(self.index_key(), &prefixed_key, indexed)
            .ignore();

        self.bounded("SET+HSET", pipe.query_async::<()>(&mut conn))
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(&prefixed_key)
            .hdel(self.index_key(), &prefixed_key)
            .ignore();

        let (deleted,): (i64,) = self
            .bounded("DEL+HDEL", pipe.query_async(&mut conn))
            .await?;

        Ok(deleted > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DomainError> {
        let prefixed_key = self.prefix_key(key);
        let index_key = self.index_key();
        let ttl_secs = Self::ttl_secs(ttl);
        let mut conn = self.connection.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .expire(&prefixed_key, ttl_secs as i64)
            .hget(&index_key, &prefixed_key);

        let (updated, indexed): (bool, Option<String>) = self
            .bounded("EXPIRE+HGET", pipe.query_async(&mut conn))
            .await?;

        // Keep the index record's expiry in step with the key
        if let Some(indexed) = indexed.filter(|_| updated) {
            let refreshed = match serde_json::from_str::<IndexedVector>(&indexed) {
                Ok(old) => IndexedVector::new(old.vector, ttl_secs).to_json()?,
                Err(_) => return Ok(updated),
            };

            self.bounded(
                "HSET",
                conn.hset::<_, _, _, ()>(&index_key, &prefixed_key, refreshed),
            )
            .await?;
        }

        Ok(updated)
    }

    async fn find_similar(
        &self,
        query: &SimilarityQuery<'_>,
    ) -> Result<Vec<SimilarKey>, DomainError> {
        let index_key = self.index_key();
        let mut conn = self.connection.clone();

        let index: HashMap<String, String> = self
            .bounded("HGETALL", conn.hgetall(&index_key))
            .await?;

        let now_ms = Utc::now().timestamp_millis();
        let mut stale: Vec<String> = Vec::new();
        let mut candidates: Vec<(String, SimilarKey)> = Vec::new();

        for (field, indexed) in index {
            let indexed = match serde_json::from_str::<IndexedVector>(&indexed) {
                Ok(indexed) if !indexed.is_expired(now_ms) => indexed,
                _ => {
                    stale.push(field);
                    continue;
                }
            };

            let Some(logical_key) = self.strip_prefix(&field) else {
                continue;
            };

            if !query.accepts_key(logical_key) {
                continue;
            }

            let similarity = similarity_score(query.vector, &indexed.vector);
            if similarity >= query.threshold {
                let similar = SimilarKey::new(logical_key, similarity);
                candidates.push((field, similar));
            }
        }

        candidates.sort_by(|a, b| {
            b.1.similarity
                .partial_cmp(&a.1.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut results = Vec::new();

        if !candidates.is_empty() {
            let mut pipe = redis::pipe();
            for (field, _) in &candidates {
                pipe.exists(field);
            }

            let exists: Vec<bool> = self
                .bounded("EXISTS", pipe.query_async(&mut conn))
                .await?;

            for ((field, similar), alive) in candidates.into_iter().zip(exists) {
                if !alive {
                    stale.push(field);
                } else if results.len() < query.limit {
                    results.push(similar);
                }
            }
        }

        if !stale.is_empty() {
            let pruned = self
                .bounded("HDEL", conn.hdel::<_, _, i64>(&index_key, &stale))
                .await;

            if let Err(e) = pruned {
                warn!("Failed to prune {} stale vector index fields: {}", stale.len(), e);
            }
        }

        Ok(results)
    }

    async fn add_to_set(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .sadd(&prefixed_key, member)
            .ignore()
            .expire(&prefixed_key, Self::ttl_secs(ttl) as i64)
            .ignore();

        self.bounded("SADD+EXPIRE", pipe.query_async::<()>(&mut conn))
            .await
    }

    async fn take_set(&self, key: &str) -> Result<Vec<String>, DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .smembers(&prefixed_key)
            .del(&prefixed_key)
            .ignore();

        let (mut members,): (Vec<String>,) = self
            .bounded("SMEMBERS+DEL", pipe.query_async(&mut conn))
            .await?;

        members.sort();
        Ok(members)
    }

    async fn increment(&self, key: &str) -> Result<u64, DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        self.bounded("INCR", conn.incr::<_, _, u64>(&prefixed_key, 1))
            .await
    }
}
