//! Cache infrastructure - Cache store implementations

mod factory;
mod in_memory;
mod redis;

pub use factory::{CacheBackend, CacheServerConfig, CacheStoreFactory};
pub use in_memory::{InMemoryCacheStore, InMemoryCacheStoreConfig};
pub use redis::{connection_url, RedisCacheStore, RedisCacheStoreConfig};
