//! Embedding provider implementations

mod openai;

pub use openai::{
    model_dimensions, OpenAiEmbeddingProvider, DEFAULT_EMBEDDING_MODEL, DEFAULT_OPENAI_BASE_URL,
};
