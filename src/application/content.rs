//! Cache-fronted public content reads.
//!
//! Listing pages live under `posts:published:{limit}:{offset}` and detail
//! views under `post:{slug}`; the orchestrator purges both on mutation.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::application::repos::{ContentStore, RepoError};
use crate::cache::{CacheConfig, TagVersionedCache, content_detail_key, content_listing_key};
use crate::domain::entities::ContentRecord;

#[derive(Clone)]
pub struct CachedContentReader {
    store: Arc<dyn ContentStore>,
    cache: TagVersionedCache,
    listing_ttl: Duration,
    detail_ttl: Duration,
}

impl CachedContentReader {
    pub fn new(store: Arc<dyn ContentStore>, cache: TagVersionedCache, config: &CacheConfig) -> Self {
        Self {
            store,
            cache,
            listing_ttl: config.listing_ttl(),
            detail_ttl: config.detail_ttl(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    #[instrument(skip(self))]
    pub async fn published_content(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ContentRecord>, RepoError> {
        let key = content_listing_key(limit, offset);
        self.cache
            .get_or_load(&key, None, self.listing_ttl, || {
                self.store.published_content(limit, offset)
            })
            .await
    }

    /// A cached "not found" counts as a hit until the entry expires or is purged.
    #[instrument(skip(self))]
    pub async fn content_by_slug(&self, slug: &str) -> Result<Option<ContentRecord>, RepoError> {
        let key = content_detail_key(slug);
        self.cache
            .get_or_load(&key, None, self.detail_ttl, || self.store.content_by_slug(slug))
            .await
    }
}
