//! Cache entry schemas

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::vector_search::SearchMatch;
use crate::domain::DomainError;

/// A cached embedding, keyed by the digest of its normalized source text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingCacheEntry {
    source_text_hash: String,
    model: String,
    vector: Vec<f32>,
    created_at: DateTime<Utc>,
}

impl EmbeddingCacheEntry {
    pub fn new(source_text_hash: impl Into<String>, model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            source_text_hash: source_text_hash.into(),
            model: model.into(),
            vector,
            created_at: Utc::now(),
        }
    }

    pub fn source_text_hash(&self) -> &str {
        &self.source_text_hash
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn into_vector(self) -> Vec<f32> {
        self.vector
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Reject entries that cannot be served: empty or non-finite vectors,
    /// a different hash than the key expects, or a stale dimensionality
    pub fn validate(
        &self,
        key: &str,
        expected_hash: &str,
        dimensions: Option<usize>,
    ) -> Result<(), DomainError> {
        if self.source_text_hash != expected_hash {
            return Err(DomainError::invalid_entry(key, "source text hash mismatch"));
        }

        if self.vector.is_empty() {
            return Err(DomainError::invalid_entry(key, "empty vector"));
        }

        if self.vector.iter().any(|x| !x.is_finite()) {
            return Err(DomainError::invalid_entry(key, "non-finite vector component"));
        }

        if let Some(expected) = dimensions {
            if self.vector.len() != expected {
                return Err(DomainError::invalid_entry(
                    key,
                    format!(
                        "expected {} dimensions, got {}",
                        expected,
                        self.vector.len()
                    ),
                ));
            }
        }

        Ok(())
    }
}

/// A cached ranked result list, looked up by query-vector similarity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultCacheEntry {
    id: String,
    namespace: Option<String>,
    query_vector: Vec<f32>,
    top_k: usize,
    result_ids: Vec<String>,
    result_scores: Vec<f32>,
    document_id_set: BTreeSet<String>,
    created_at: DateTime<Utc>,
}

impl SearchResultCacheEntry {
    /// Build an entry from upstream matches, keeping at most `top_k`
    pub fn from_matches(
        id: impl Into<String>,
        namespace: Option<String>,
        query_vector: Vec<f32>,
        top_k: usize,
        matches: &[SearchMatch],
    ) -> Self {
        let kept = &matches[..matches.len().min(top_k)];
        let result_ids: Vec<String> = kept.iter().map(|m| m.id.clone()).collect();
        let result_scores = kept.iter().map(|m| m.score).collect();
        let document_id_set = result_ids.iter().cloned().collect();

        Self {
            id: id.into(),
            namespace,
            query_vector,
            top_k,
            result_ids,
            result_scores,
            document_id_set,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn query_vector(&self) -> &[f32] {
        &self.query_vector
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn result_ids(&self) -> &[String] {
        &self.result_ids
    }

    pub fn result_scores(&self) -> &[f32] {
        &self.result_scores
    }

    pub fn document_id_set(&self) -> &BTreeSet<String> {
        &self.document_id_set
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// A cached superset may serve a smaller request, never the reverse
    pub fn can_serve(&self, top_k: usize, namespace: Option<&str>) -> bool {
        self.top_k >= top_k && self.namespace.as_deref() == namespace
    }

    /// The first `top_k` cached matches
    pub fn matches(&self, top_k: usize) -> Vec<SearchMatch> {
        self.result_ids
            .iter()
            .zip(self.result_scores.iter())
            .take(top_k)
            .map(|(id, score)| SearchMatch::new(id.clone(), *score))
            .collect()
    }

    pub fn validate(&self, key: &str) -> Result<(), DomainError> {
        if self.result_ids.len() != self.result_scores.len() {
            return Err(DomainError::invalid_entry(
                key,
                "result ids and scores differ in length",
            ));
        }

        if self.result_ids.len() > self.top_k {
            return Err(DomainError::invalid_entry(key, "more results than top_k"));
        }

        if self.query_vector.is_empty() {
            return Err(DomainError::invalid_entry(key, "empty query vector"));
        }

        let ids: BTreeSet<&String> = self.result_ids.iter().collect();
        if ids.len() != self.document_id_set.len()
            || !ids.iter().all(|id| self.document_id_set.contains(*id))
        {
            return Err(DomainError::invalid_entry(
                key,
                "document id set does not match result ids",
            ));
        }

        Ok(())
    }
}
