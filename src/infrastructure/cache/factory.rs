//! Cache store factory for runtime backend selection

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::domain::cache::CacheStore;
use crate::domain::DomainError;

use super::in_memory::{InMemoryCacheStore, InMemoryCacheStoreConfig};
use super::redis::{connection_url, RedisCacheStore, RedisCacheStoreConfig};

/// Supported cache backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process store using moka
    #[default]
    Memory,
    /// Redis server
    Redis,
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Memory => write!(f, "memory"),
            CacheBackend::Redis => write!(f, "redis"),
        }
    }
}

/// `cache_server` configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheServerConfig {
    pub backend: CacheBackend,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub key_prefix: String,
    pub operation_timeout_ms: u64,
    pub connection_timeout_ms: u64,
    /// Memory backend only
    pub max_capacity: u64,
}

impl Default for CacheServerConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            url: "redis://127.0.0.1:6379".to_string(),
            username: None,
            password: None,
            key_prefix: "ssc".to_string(),
            operation_timeout_ms: 150,
            connection_timeout_ms: 5000,
            max_capacity: 100_000,
        }
    }
}

impl CacheServerConfig {
    /// Configuration for the in-process backend
    pub fn memory() -> Self {
        Self::default()
    }

    /// Configuration for a Redis server
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: CacheBackend::Redis,
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_credentials(mut self, username: Option<String>, password: impl Into<String>) -> Self {
        self.username = username;
        self.password = Some(password.into());
        self
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.operation_timeout_ms == 0 {
            return Err(DomainError::configuration(
                "cache_server.operation_timeout_ms must be greater than zero",
            ));
        }

        if self.backend == CacheBackend::Redis && self.url.trim().is_empty() {
            return Err(DomainError::configuration(
                "cache_server.url is required for the redis backend",
            ));
        }

        Ok(())
    }
}

/// Factory for creating cache store instances
#[derive(Debug, Default)]
pub struct CacheStoreFactory;

impl CacheStoreFactory {
    pub fn new() -> Self {
        Self
    }

    /// Creates a store for the configured backend. A Redis server that cannot
    /// be reached at startup is an error.
    pub async fn create(
        &self,
        config: &CacheServerConfig,
    ) -> Result<Arc<dyn CacheStore>, DomainError> {
        config.validate()?;

        match config.backend {
            CacheBackend::Memory => {
                let store = InMemoryCacheStore::with_config(
                    InMemoryCacheStoreConfig::default().with_max_capacity(config.max_capacity),
                );
                info!(max_capacity = config.max_capacity, "Using in-memory cache store");
                Ok(Arc::new(store))
            }
            CacheBackend::Redis => {
                let url = connection_url(
                    &config.url,
                    config.username.as_deref(),
                    config.password.as_deref(),
                );

                let mut redis_config = RedisCacheStoreConfig::new(url)
                    .with_operation_timeout(config.operation_timeout())
                    .with_connection_timeout(config.connection_timeout());

                if !config.key_prefix.is_empty() {
                    redis_config = redis_config.with_key_prefix(config.key_prefix.clone());
                }

                let store = RedisCacheStore::new(redis_config).await?;
                info!(prefix = %config.key_prefix, "Connected to Redis cache store");
                Ok(Arc::new(store))
            }
        }
    }

    /// Creates an in-memory store with default settings
    pub fn create_in_memory(&self) -> Arc<dyn CacheStore> {
        Arc::new(InMemoryCacheStore::new())
    }
}
