//! Cache key layout and text normalization

use sha2::{Digest, Sha256};

const EMBEDDING_NAMESPACE: &str = "emb";
const SEARCH_NAMESPACE: &str = "search";
const DOCUMENT_INDEX_NAMESPACE: &str = "docidx";
const DOCUMENT_CHANGE_NAMESPACE: &str = "docchg";
const INVALIDATION_EPOCH_KEY: &str = "invepoch";
const DEFAULT_SEARCH_SCOPE: &str = "_";

/// Normalizes input text before hashing so that trivially different inputs
/// share one embedding entry
#[derive(Debug, Clone, Copy)]
pub struct TextNormalizer {
    case_fold: bool,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self { case_fold: true }
    }
}

impl TextNormalizer {
    pub fn new(case_fold: bool) -> Self {
        Self { case_fold }
    }

    /// Trims, collapses whitespace runs to a single space and optionally
    /// lowercases. Idempotent.
    pub fn normalize(&self, text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

        if self.case_fold {
            collapsed.to_lowercase()
        } else {
            collapsed
        }
    }

    /// Hex-encoded SHA-256 digest of the normalized text
    pub fn hash(&self, text: &str) -> String {
        text_digest(&self.normalize(text))
    }
}

/// Hex-encoded SHA-256 digest of already normalized text
pub fn text_digest(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds the logical keys used by the cache tiers
///
/// Physical prefixing (per deployment) is the store's concern.
#[derive(Debug, Clone, Default)]
pub struct CacheKeys;

impl CacheKeys {
    /// `emb:<model>:<hash>`
    pub fn embedding(model: &str, text_hash: &str) -> String {
        format!("{}:{}:{}", EMBEDDING_NAMESPACE, model, text_hash)
    }

    /// Prefix shared by every search entry in a namespace
    pub fn search_scope(namespace: Option<&str>) -> String {
        format!(
            "{}:{}:",
            SEARCH_NAMESPACE,
            namespace.unwrap_or(DEFAULT_SEARCH_SCOPE)
        )
    }

    /// `search:<namespace or _>:<entry id>`
    pub fn search_entry(namespace: Option<&str>, entry_id: &str) -> String {
        format!("{}{}", Self::search_scope(namespace), entry_id)
    }

    /// `docidx:<document id>` - reverse index from document to search entries
    pub fn document_index(document_id: &str) -> String {
        format!("{}:{}", DOCUMENT_INDEX_NAMESPACE, document_id)
    }

    /// `docchg:<document id>` - invalidation epoch of the document's last change
    pub fn document_change(document_id: &str) -> String {
        format!("{}:{}", DOCUMENT_CHANGE_NAMESPACE, document_id)
    }

    /// Counter bumped by every document invalidation
    pub fn invalidation_epoch() -> String {
        INVALIDATION_EPOCH_KEY.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_collapses() {
        let normalizer = TextNormalizer::default();
        assert_eq!(normalizer.normalize("  Hello \t  World\n"), "hello world");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let normalizer = TextNormalizer::default();
        let once = normalizer.normalize("  Mixed   CASE\ttext ");
        assert_eq!(normalizer.normalize(&once), once);
    }

    #[test]
    fn test_normalize_without_case_fold() {
        let normalizer = TextNormalizer::new(false);
        assert_eq!(normalizer.normalize(" Hello  World "), "Hello World");
    }

    #[test]
    fn test_hash_is_stable() {
        let normalizer = TextNormalizer::default();

        // SHA-256("hello world")
        assert_eq!(
            normalizer.hash("Hello World"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_distinct_texts_hash_differently() {
        let normalizer = TextNormalizer::default();
        assert_ne!(normalizer.hash("hello world"), normalizer.hash("hello worlds"));
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(CacheKeys::embedding("m", "abc"), "emb:m:abc");
        assert_eq!(CacheKeys::search_entry(None, "id1"), "search:_:id1");
        assert_eq!(
            CacheKeys::search_entry(Some("blogs"), "id1"),
            "search:blogs:id1"
        );
        assert!(CacheKeys::search_entry(Some("blogs"), "x")
            .starts_with(&CacheKeys::search_scope(Some("blogs"))));
        assert_eq!(CacheKeys::document_index("d1"), "docidx:d1");
        assert_eq!(CacheKeys::document_change("d1"), "docchg:d1");
        assert_ne!(CacheKeys::invalidation_epoch(), CacheKeys::document_change("epoch"));
    }
}
