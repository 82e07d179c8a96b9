//! Cache key construction.
//!
//! Every logical key is a colon-joined string. Tagged keys get a `:v{version}`
//! suffix at access time; see [`crate::cache::TagVersionedCache`].

use std::fmt::Display;

/// Tag shared by the lexical index and every other search derived entry.
pub const TAG_SEARCH: &str = "search";

const VERSION_PREFIX: &str = "cache:version";

/// Join a prefix and its parameters into one key: `prefix:p1:p2`.
pub fn cache_key<I, P>(prefix: &str, params: I) -> String
where
    I: IntoIterator<Item = P>,
    P: Display,
{
    let mut key = String::from(prefix);
    for param in params {
        key.push(':');
        key.push_str(&param.to_string());
    }
    key
}

/// Counter entry holding the current version of `tag`.
pub fn version_key(tag: &str) -> String {
    format!("{VERSION_PREFIX}:{tag}")
}

pub(crate) fn versioned_key(key: &str, version: &str) -> String {
    format!("{key}:v{version}")
}

pub fn search_index_key(limit: usize) -> String {
    cache_key("search:index", [limit])
}

/// Trimmed, lowercased and cut to 64 characters. Full-text cache keys and the
/// cached search itself both use this form.
pub fn normalize_fulltext_query(query: &str) -> String {
    query.trim().to_lowercase().chars().take(64).collect()
}

pub fn fulltext_key(normalized_query: &str, limit: usize) -> String {
    format!("search:fts:{limit}:{normalized_query}")
}

pub fn content_detail_key(slug: &str) -> String {
    cache_key("post", [slug])
}

pub fn content_listing_key(limit: u32, offset: u32) -> String {
    cache_key("posts:published", [limit, offset])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_joins_params() {
        assert_eq!(cache_key("posts:published", [10, 0]), "posts:published:10:0");
        assert_eq!(cache_key::<[u8; 0], u8>("bare", []), "bare");
    }

    #[test]
    fn version_keys() {
        assert_eq!(version_key("search"), "cache:version:search");
        assert_eq!(versioned_key("search:index:500", "3"), "search:index:500:v3");
    }

    #[test]
    fn fulltext_query_normalization() {
        let normalized = normalize_fulltext_query("  Rust AXUM ");
        assert_eq!(normalized, "rust axum");
        assert_eq!(fulltext_key(&normalized, 20), "search:fts:20:rust axum");
        assert_eq!(normalize_fulltext_query(&"x".repeat(100)).len(), 64);
    }

    #[test]
    fn content_keys() {
        assert_eq!(content_detail_key("hello-world"), "post:hello-world");
        assert_eq!(content_listing_key(20, 0), "posts:published:20:0");
        assert_eq!(search_index_key(500), "search:index:500");
    }
}
