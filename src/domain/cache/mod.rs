//! Cache domain - Store abstraction and key layout

mod key;
mod store;

pub use key::{text_digest, CacheKeys, TextNormalizer};
pub use store::{CacheStore, CacheStoreExt, SimilarKey, SimilarityQuery};

#[cfg(test)]
pub use store::mock::UnavailableCacheStore;
