//! Vector search service implementations

mod in_memory;
mod pinecone;

pub use in_memory::InMemoryVectorSearch;
pub use pinecone::PineconeVectorSearch;
