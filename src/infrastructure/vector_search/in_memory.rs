//! In-memory vector index for development and testing

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::embedding::cosine_similarity;
use crate::domain::vector_search::{SearchMatch, VectorDocument, VectorSearchService};
use crate::domain::DomainError;

const DEFAULT_NAMESPACE: &str = "";

/// Brute-force vector index, one document map per namespace
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorSearch {
    namespaces: Arc<RwLock<HashMap<String, HashMap<String, VectorDocument>>>>,
}

impl InMemoryVectorSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents stored in a namespace
    pub async fn len(&self, namespace: Option<&str>) -> usize {
        let namespaces = self.namespaces.read().await;
        namespaces
            .get(namespace.unwrap_or(DEFAULT_NAMESPACE))
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl VectorSearchService for InMemoryVectorSearch {
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<SearchMatch>, DomainError> {
        let namespaces = self.namespaces.read().await;

        let Some(documents) = namespaces.get(namespace.unwrap_or(DEFAULT_NAMESPACE)) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<SearchMatch> = documents
            .values()
            .map(|doc| SearchMatch::new(&doc.id, cosine_similarity(vector, &doc.vector)))
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn upsert(
        &self,
        documents: &[VectorDocument],
        namespace: Option<&str>,
    ) -> Result<usize, DomainError> {
        let mut namespaces = self.namespaces.write().await;
        let target = namespaces
            .entry(namespace.unwrap_or(DEFAULT_NAMESPACE).to_string())
            .or_default();

        for doc in documents {
            target.insert(doc.id.clone(), doc.clone());
        }

        Ok(documents.len())
    }

    async fn delete(&self, ids: &[String], namespace: Option<&str>) -> Result<(), DomainError> {
        let mut namespaces = self.namespaces.write().await;

        if let Some(target) = namespaces.get_mut(namespace.unwrap_or(DEFAULT_NAMESPACE)) {
            for id in ids {
                target.remove(id);
            }
        }

        Ok(())
    }

    fn service_name(&self) -> &'static str {
        "in_memory"
    }
}
