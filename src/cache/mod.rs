//! Caching layers for the retrieval core.
//!
//! - **KV cache** ([`TagVersionedCache`]): serialized values with per-tag bulk
//!   invalidation through version counters.
//! - **Edge cache** ([`EdgeResponseCache`]): whole HTTP responses for anonymous
//!   GET traffic, purged per URL.
//!
//! Both are advisory. A failing store reads as a miss and writes as a no-op.
//! [`CacheOrchestrator`] sequences invalidation across both after a content
//! mutation.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enable_kv_cache = true
//! enable_edge_cache = true
//! kv_backend = "database"
//! listing_page_sizes = [10, 20]
//! # ... see config.rs for all options
//! ```

mod config;
mod edge;
mod error;
mod headers;
mod keys;
mod kv;
mod lock;
mod middleware;
mod orchestrator;
mod tagged;

pub use config::CacheConfig;
pub use edge::{
    CachedResponse, EDGE_CACHE_HEADER, EdgeCacheKey, EdgeResponseCache, MemoryResponseStore,
    ResponseStore, with_edge_cache_headers,
};
pub use error::CacheUnavailable;
pub use headers::{CacheControl, with_cache_headers};
pub use keys::{
    TAG_SEARCH, cache_key, content_detail_key, content_listing_key, fulltext_key,
    normalize_fulltext_query, search_index_key, version_key,
};
pub use kv::{KvStore, MemoryKvStore};
pub use middleware::{EdgeCacheState, edge_cache_layer};
pub use orchestrator::{CacheOrchestrator, ContentChange, OrchestrationReport, VectorSync};
pub use tagged::TagVersionedCache;
