//! Prometheus metrics infrastructure

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use super::config::MetricsConfig;
use crate::domain::DomainError;

/// Cache tier a lookup was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Embedding,
    Search,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Embedding => "embedding",
            CacheTier::Search => "search",
        }
    }
}

/// Result of a single cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Hit,
    Miss,
    /// The store failed or held an unusable entry; served as a miss
    Error,
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Hit => "hit",
            LookupOutcome::Miss => "miss",
            LookupOutcome::Error => "error",
        }
    }
}

/// Install the Prometheus recorder and its scrape listener.
///
/// Returns `Ok(false)` when metrics are disabled. Must run inside a Tokio
/// runtime.
pub fn init_metrics(config: &MetricsConfig) -> Result<bool, DomainError> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return Ok(false);
    }

    let addr: SocketAddr = config.listen_addr.parse().map_err(|e| {
        DomainError::configuration(format!(
            "Invalid metrics.listen_addr '{}': {}",
            config.listen_addr, e
        ))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| {
            DomainError::configuration(format!("Failed to install Prometheus exporter: {}", e))
        })?;

    register_default_metrics();
    tracing::info!("Prometheus metrics listening on {}", addr);

    Ok(true)
}

fn register_default_metrics() {
    gauge!("semantic_cache_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record one lookup against a cache tier
pub fn record_cache_lookup(tier: CacheTier, outcome: LookupOutcome) {
    counter!(
        "semantic_cache_lookups_total",
        "tier" => tier.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record search entries evicted by document invalidation
pub fn record_invalidation(entries_evicted: usize) {
    counter!("semantic_cache_invalidations_total").increment(entries_evicted as u64);
}

/// Record the latency of an upstream call
pub fn record_upstream(service: &'static str, duration: Duration, success: bool) {
    let labels = [
        ("service", service.to_string()),
        ("status", if success { "success" } else { "error" }.to_string()),
    ];

    histogram!("semantic_cache_upstream_duration_seconds", &labels)
        .record(duration.as_secs_f64());

    if !success {
        counter!("semantic_cache_upstream_errors_total", &labels).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_values() {
        assert_eq!(CacheTier::Embedding.as_str(), "embedding");
        assert_eq!(CacheTier::Search.as_str(), "search");
        assert_eq!(LookupOutcome::Hit.as_str(), "hit");
        assert_eq!(LookupOutcome::Miss.as_str(), "miss");
        assert_eq!(LookupOutcome::Error.as_str(), "error");
    }

    #[test]
    fn test_disabled_metrics_install_nothing() {
        let installed = init_metrics(&MetricsConfig::default()).unwrap();
        assert!(!installed);
    }

    #[test]
    fn test_invalid_listen_addr() {
        let config = MetricsConfig {
            enabled: true,
            listen_addr: "not-an-address".to_string(),
        };

        assert!(matches!(
            init_metrics(&config),
            Err(DomainError::Configuration { .. })
        ));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_cache_lookup(CacheTier::Search, LookupOutcome::Hit);
        record_invalidation(3);
        record_upstream("openai", Duration::from_millis(20), true);
    }
}
