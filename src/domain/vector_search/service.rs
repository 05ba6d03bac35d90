//! Vector search service trait

use std::fmt::Debug;

use async_trait::async_trait;

use super::{SearchMatch, VectorDocument};
use crate::domain::DomainError;

/// Narrow contract over the external vector index
///
/// The index's storage engine is opaque; callers of `upsert`/`delete` are
/// responsible for triggering cache invalidation.
#[async_trait]
pub trait VectorSearchService: Send + Sync + Debug {
    /// Ranked nearest documents, best first
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<SearchMatch>, DomainError>;

    /// Insert or replace documents
    async fn upsert(
        &self,
        documents: &[VectorDocument],
        namespace: Option<&str>,
    ) -> Result<usize, DomainError>;

    /// Remove documents by id
    async fn delete(&self, ids: &[String], namespace: Option<&str>) -> Result<(), DomainError>;

    /// Get the service name
    fn service_name(&self) -> &'static str;
}
