//! Cache configuration.
//!
//! Controls the tag-versioned KV cache and the edge response cache.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_EDGE_CAPACITY: usize = 200;
const DEFAULT_EDGE_TTL_SECONDS: u64 = 300;
const DEFAULT_EDGE_BODY_LIMIT_BYTES: usize = 1024 * 1024;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 250;
const DEFAULT_SEARCH_INDEX_TTL_SECONDS: u64 = 900;
const DEFAULT_FULLTEXT_TTL_SECONDS: u64 = 120;
const DEFAULT_DETAIL_TTL_SECONDS: u64 = 600;
const DEFAULT_LISTING_TTL_SECONDS: u64 = 300;
const DEFAULT_LISTING_PAGE_SIZES: [u32; 2] = [10, 20];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the tag-versioned KV cache. When off every read is a miss.
    pub enable_kv_cache: bool,
    /// Enable the edge response cache middleware.
    pub enable_edge_cache: bool,
    /// Maximum responses held by the in-memory edge store.
    pub edge_capacity: usize,
    /// `max-age` written onto responses stored at the edge.
    pub edge_ttl_seconds: u64,
    /// Larger bodies are passed through uncached.
    pub edge_body_limit_bytes: usize,
    /// Upper bound on a single KV store call before it counts as a miss.
    pub store_timeout_ms: u64,
    pub search_index_ttl_seconds: u64,
    pub fulltext_ttl_seconds: u64,
    pub detail_ttl_seconds: u64,
    pub listing_ttl_seconds: u64,
    /// First-page listing sizes the orchestrator purges on every mutation.
    pub listing_page_sizes: Vec<u32>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_kv_cache: true,
            enable_edge_cache: true,
            edge_capacity: DEFAULT_EDGE_CAPACITY,
            edge_ttl_seconds: DEFAULT_EDGE_TTL_SECONDS,
            edge_body_limit_bytes: DEFAULT_EDGE_BODY_LIMIT_BYTES,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            search_index_ttl_seconds: DEFAULT_SEARCH_INDEX_TTL_SECONDS,
            fulltext_ttl_seconds: DEFAULT_FULLTEXT_TTL_SECONDS,
            detail_ttl_seconds: DEFAULT_DETAIL_TTL_SECONDS,
            listing_ttl_seconds: DEFAULT_LISTING_TTL_SECONDS,
            listing_page_sizes: DEFAULT_LISTING_PAGE_SIZES.to_vec(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_kv_cache: settings.enable_kv_cache,
            enable_edge_cache: settings.enable_edge_cache,
            edge_capacity: settings.edge_capacity,
            edge_ttl_seconds: settings.edge_ttl_seconds,
            edge_body_limit_bytes: settings.edge_body_limit_bytes,
            store_timeout_ms: settings.store_timeout_ms,
            search_index_ttl_seconds: settings.search_index_ttl_seconds,
            fulltext_ttl_seconds: settings.fulltext_ttl_seconds,
            detail_ttl_seconds: settings.detail_ttl_seconds,
            listing_ttl_seconds: settings.listing_ttl_seconds,
            listing_page_sizes: settings.listing_page_sizes.clone(),
        }
    }
}

impl CacheConfig {
    /// Returns the edge capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn edge_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.edge_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms.max(1))
    }

    pub fn search_index_ttl(&self) -> Duration {
        Duration::from_secs(self.search_index_ttl_seconds)
    }

    pub fn fulltext_ttl(&self) -> Duration {
        Duration::from_secs(self.fulltext_ttl_seconds)
    }

    pub fn detail_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_ttl_seconds)
    }

    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.listing_ttl_seconds)
    }
}
