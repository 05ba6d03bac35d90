use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    /// The cache server could not be reached or did not answer in time
    #[error("Cache unavailable: {message}")]
    CacheUnavailable { message: String },

    /// A stored cache value failed to decode or validate
    #[error("Invalid cache entry '{key}': {message}")]
    InvalidEntry { key: String, message: String },

    /// The embedding provider or the vector index failed
    #[error("Upstream error: {service} - {message}")]
    UpstreamCompute { service: String, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn cache_unavailable(message: impl Into<String>) -> Self {
        Self::CacheUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_entry(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEntry {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamCompute {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Errors raised by the cache layer itself, which callers recover from
    /// by treating the lookup as a miss
    pub fn is_cache_error(&self) -> bool {
        matches!(
            self,
            Self::CacheUnavailable { .. } | Self::InvalidEntry { .. }
        )
    }
}
