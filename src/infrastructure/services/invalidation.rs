//! Document-to-entry reverse index and targeted eviction

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::domain::cache::{CacheKeys, CacheStore};
use crate::domain::DomainError;

/// Outcome of invalidating one or more documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    /// Distinct documents processed
    pub documents: usize,
    /// Search entries referenced by those documents' reverse index
    pub entries_referenced: usize,
    /// Search entries actually deleted (not already expired or evicted)
    pub entries_evicted: usize,
}

impl InvalidationReport {
    fn merge(&mut self, other: InvalidationReport) {
        self.documents += other.documents;
        self.entries_referenced += other.entries_referenced;
        self.entries_evicted += other.entries_evicted;
    }
}

const DEFAULT_MARKER_TTL: Duration = Duration::from_secs(3600);

/// Keeps `docidx:<document id>` sets in the store, one member per search
/// entry whose results contain that document
///
/// Every change also bumps a store-wide invalidation epoch and records it in
/// `docchg:<document id>`. A search that read the epoch before querying the
/// index can then tell, after storing its entry, whether one of its documents
/// changed while the query was in flight (see [`changed_since`](Self::changed_since)).
///
/// Newly created documents cannot appear in any cached result, so their creation
/// evicts nothing; cached searches that should now include them stay stale
/// until the search TTL expires.
#[derive(Debug, Clone)]
pub struct InvalidationCoordinator {
    store: Arc<dyn CacheStore>,
    marker_ttl: Duration,
}

impl InvalidationCoordinator {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            marker_ttl: DEFAULT_MARKER_TTL,
        }
    }

    /// How long change markers are kept. Must exceed the longest upstream
    /// search.
    pub fn with_marker_ttl(mut self, ttl: Duration) -> Self {
        self.marker_ttl = ttl;
        self
    }

    /// Current invalidation epoch (0 before any change)
    pub async fn epoch(&self) -> Result<u64, DomainError> {
        let key = CacheKeys::invalidation_epoch();

        match self.store.get_raw(&key).await? {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| DomainError::invalid_entry(key, "epoch is not an integer")),
            None => Ok(0),
        }
    }

    /// Whether any of the documents changed after `epoch` was read.
    /// An epoch counter that went backwards counts as a change.
    pub async fn changed_since<I>(&self, document_ids: I, epoch: u64) -> Result<bool, DomainError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        if self.epoch().await? < epoch {
            return Ok(true);
        }

        let marker_keys: Vec<String> = document_ids
            .into_iter()
            .map(|id| CacheKeys::document_change(id.as_ref()))
            .collect();

        let markers = join_all(marker_keys.iter().map(|key| self.store.get_raw(key))).await;

        for marker in markers {
            if let Some(value) = marker? {
                match value.trim().parse::<u64>() {
                    Ok(changed_at) if changed_at <= epoch => {}
                    _ => return Ok(true),
                }
            }
        }

        Ok(false)
    }

    /// Records that `entry_key` holds results containing each document.
    /// The index sets live at least as long as `ttl`.
    #[instrument(skip(self, document_ids, ttl))]
    pub async fn register<I>(
        &self,
        entry_key: &str,
        document_ids: I,
        ttl: Duration,
    ) -> Result<(), DomainError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for document_id in document_ids {
            let index_key = CacheKeys::document_index(document_id.as_ref());
            self.store.add_to_set(&index_key, entry_key, ttl).await?;
        }

        Ok(())
    }

    /// Evicts every search entry whose results contain `document_id`.
    /// Returns once every delete has completed. Unknown documents are a no-op.
    #[instrument(skip(self))]
    pub async fn on_document_changed(
        &self,
        document_id: &str,
    ) -> Result<InvalidationReport, DomainError> {
        let epoch = self.store.increment(&CacheKeys::invalidation_epoch()).await?;
        self.store
            .set_raw(
                &CacheKeys::document_change(document_id),
                &epoch.to_string(),
                self.marker_ttl,
            )
            .await?;

        let index_key = CacheKeys::document_index(document_id);
        let entry_keys = self.store.take_set(&index_key).await?;

        let mut report = InvalidationReport {
            documents: 1,
            entries_referenced: entry_keys.len(),
            entries_evicted: 0,
        };

        for entry_key in &entry_keys {
            if self.store.delete(entry_key).await? {
                report.entries_evicted += 1;
            }
        }

        debug!(
            document_id = %document_id,
            evicted = report.entries_evicted,
            "Invalidated cached searches"
        );

        Ok(report)
    }

    /// Invalidates each distinct document. Every document is attempted; the
    /// first failure is returned after the rest have been processed.
    #[instrument(skip_all, fields(count = document_ids.len()))]
    pub async fn on_batch_changed<S>(
        &self,
        document_ids: &[S],
    ) -> Result<InvalidationReport, DomainError>
    where
        S: AsRef<str> + Sync,
    {
        let distinct: BTreeSet<&str> = document_ids.iter().map(AsRef::as_ref).collect();

        let mut report = InvalidationReport::default();
        let mut first_error = None;

        for document_id in distinct {
            match self.on_document_changed(document_id).await {
                Ok(single) => report.merge(single),
                Err(e) => {
                    warn!(document_id = %document_id, "Invalidation failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::UnavailableCacheStore;
    use crate::infrastructure::cache::InMemoryCacheStore;

    const TTL: Duration = Duration::from_secs(60);

    async fn seeded() -> (Arc<InMemoryCacheStore>, InvalidationCoordinator) {
        let store = Arc::new(InMemoryCacheStore::new());
        let coordinator = InvalidationCoordinator::new(store.clone());

        for (key, docs) in [
            ("search:_:e1", vec!["d1", "d2", "d3"]),
            ("search:_:e2", vec!["d2", "d4"]),
            ("search:_:e3", vec!["d5"]),
        ] {
            store.set_raw(key, "{}", TTL).await.unwrap();
            coordinator.register(key, docs, TTL).await.unwrap();
        }

        (store, coordinator)
    }

    #[tokio::test]
    async fn test_evicts_every_entry_containing_document() {
        let (store, coordinator) = seeded().await;

        let report = coordinator.on_document_changed("d2").await.unwrap();

        assert_eq!(report.entries_referenced, 2);
        assert_eq!(report.entries_evicted, 2);
        assert!(store.get_raw("search:_:e1").await.unwrap().is_none());
        assert!(store.get_raw("search:_:e2").await.unwrap().is_none());
        assert!(store.get_raw("search:_:e3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidation_is_idempotent() {
        let (store, coordinator) = seeded().await;

        coordinator.on_document_changed("d1").await.unwrap();
        let second = coordinator.on_document_changed("d1").await.unwrap();

        assert_eq!(second.entries_referenced, 0);
        assert_eq!(second.entries_evicted, 0);
        assert!(store.get_raw("search:_:e2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_document_is_noop() {
        let (_, coordinator) = seeded().await;

        let report = coordinator.on_document_changed("brand-new").await.unwrap();

        assert_eq!(report.documents, 1);
        assert_eq!(report.entries_evicted, 0);
    }

    #[tokio::test]
    async fn test_already_evicted_entries_count_as_referenced_only() {
        let (store, coordinator) = seeded().await;
        store.delete("search:_:e1").await.unwrap();

        let report = coordinator.on_document_changed("d1").await.unwrap();

        assert_eq!(report.entries_referenced, 1);
        assert_eq!(report.entries_evicted, 0);
    }

    #[tokio::test]
    async fn test_batch_deduplicates_and_aggregates() {
        let (store, coordinator) = seeded().await;

        let report = coordinator
            .on_batch_changed(&["d1", "d5", "d1", "d3"])
            .await
            .unwrap();

        assert_eq!(report.documents, 3);
        // d1 and d3 both reference e1; it is deleted once
        assert_eq!(report.entries_evicted, 2);
        assert!(store.get_raw("search:_:e2").await.unwrap().is_some());

        let again = coordinator
            .on_batch_changed(&["d1", "d5", "d3"])
            .await
            .unwrap();
        assert_eq!(again.entries_evicted, 0);
    }

    #[tokio::test]
    async fn test_changed_since_tracks_documents_changed_after_epoch() {
        let (_, coordinator) = seeded().await;

        let before = coordinator.epoch().await.unwrap();
        assert_eq!(before, 0);

        coordinator.on_document_changed("d1").await.unwrap();
        let after = coordinator.epoch().await.unwrap();
        assert_eq!(after, 1);

        assert!(coordinator.changed_since(["d1", "d4"], before).await.unwrap());
        assert!(!coordinator.changed_since(["d3", "d4"], before).await.unwrap());
        assert!(!coordinator.changed_since(["d1"], after).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_epoch_counts_as_change() {
        let (store, coordinator) = seeded().await;

        coordinator.on_document_changed("d5").await.unwrap();
        let epoch = coordinator.epoch().await.unwrap();
        store.delete(&CacheKeys::invalidation_epoch()).await.unwrap();

        assert!(coordinator.changed_since(["d1"], epoch).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_is_reported() {
        let coordinator = InvalidationCoordinator::new(Arc::new(UnavailableCacheStore));

        let result = coordinator.on_batch_changed(&["d1".to_string()]).await;
        assert!(matches!(result, Err(DomainError::CacheUnavailable { .. })));

        let result = coordinator.register("search:_:e1", ["d1"], TTL).await;
        assert!(matches!(result, Err(DomainError::CacheUnavailable { .. })));
    }
}
