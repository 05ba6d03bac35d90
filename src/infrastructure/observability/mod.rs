//! Observability infrastructure - Prometheus metrics

mod config;
mod metrics;

pub use config::MetricsConfig;
pub use metrics::{
    init_metrics, record_cache_lookup, record_invalidation, record_upstream, CacheTier,
    LookupOutcome,
};
