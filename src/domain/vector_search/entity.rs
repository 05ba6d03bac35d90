//! Vector index entities

use serde::{Deserialize, Serialize};

/// A single ranked hit returned by the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    /// Document identifier
    pub id: String,
    /// Similarity score reported by the index
    pub score: f32,
}

impl SearchMatch {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Document payload written to the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    /// Document identifier, also the invalidation key
    pub id: String,
    /// Embedding of the document text
    pub vector: Vec<f32>,
    /// Flat metadata stored next to the vector
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl VectorDocument {
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}
