//! Vector search domain - the external similarity index

mod entity;
mod service;

pub use entity::{SearchMatch, VectorDocument};
pub use service::VectorSearchService;

#[cfg(test)]
pub use service::mock::MockVectorSearch;
