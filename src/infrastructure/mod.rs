//! Infrastructure layer - External service implementations

pub mod cache;
pub mod embedding;
pub mod http_client;
pub mod logging;
pub mod observability;
pub mod services;
pub mod vector_search;
