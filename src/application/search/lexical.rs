//! Compact search index built from published content.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::application::repos::ContentStore;
use crate::cache::{CacheConfig, TAG_SEARCH, TagVersionedCache, search_index_key};
use crate::domain::search::SearchIndexItem;

use super::error::SearchBackendError;

pub const DEFAULT_INDEX_LIMIT: u32 = 500;

#[derive(Clone)]
pub struct LexicalIndexBuilder {
    store: Arc<dyn ContentStore>,
    cache: TagVersionedCache,
    ttl: Duration,
    timeout: Duration,
}

impl LexicalIndexBuilder {
    pub fn new(
        store: Arc<dyn ContentStore>,
        cache: TagVersionedCache,
        config: &CacheConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            ttl: config.search_index_ttl(),
            timeout,
        }
    }

    /// Up to `limit` live items, newest first, in the store's order.
    #[instrument(skip(self))]
    pub async fn build(&self, limit: u32) -> Result<Vec<SearchIndexItem>, SearchBackendError> {
        let records = tokio::time::timeout(self.timeout, self.store.published_content(limit, 0))
            .await
            .map_err(|_| SearchBackendError::Timeout {
                elapsed_ms: self.timeout.as_millis() as u64,
            })??;

        let items: Vec<SearchIndexItem> = records
            .iter()
            .filter_map(SearchIndexItem::from_record)
            .collect();
        debug!(items = items.len(), "search index built");
        Ok(items)
    }

    /// [`Self::build`] fronted by the KV cache under the `search` tag.
    pub async fn build_cached(&self, limit: u32) -> Result<Vec<SearchIndexItem>, SearchBackendError> {
        let key = search_index_key(limit as usize);
        self.cache
            .get_or_load(&key, Some(TAG_SEARCH), self.ttl, || self.build(limit))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::application::repos::RepoError;
    use crate::cache::MemoryKvStore;
    use crate::domain::entities::ContentRecord;
    use crate::domain::types::ContentStatus;

    struct FixedStore {
        records: Vec<ContentRecord>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentStore for FixedStore {
        async fn published_content(
            &self,
            limit: u32,
            offset: u32,
        ) -> Result<Vec<ContentRecord>, RepoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .records
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn content_by_id(&self, _id: Uuid) -> Result<Option<ContentRecord>, RepoError> {
            Ok(None)
        }

        async fn content_by_slug(&self, _slug: &str) -> Result<Option<ContentRecord>, RepoError> {
            Ok(None)
        }

        async fn all_content(&self) -> Result<Vec<ContentRecord>, RepoError> {
            Ok(self.records.clone())
        }
    }

    fn record(slug: &str, excerpt: Option<&str>) -> ContentRecord {
        ContentRecord {
            id: Uuid::new_v4(),
            slug: slug.into(),
            title: slug.to_uppercase(),
            excerpt: excerpt.map(str::to_string),
            body: "b".repeat(250),
            status: ContentStatus::Published,
            published_at: Some(datetime!(2024-01-01 0:00 UTC)),
            reading_time: Some(2),
            category_id: None,
            tags: vec!["rust".into(), "cache".into()],
        }
    }

    fn builder(store: Arc<FixedStore>, cache: TagVersionedCache) -> LexicalIndexBuilder {
        LexicalIndexBuilder::new(
            store,
            cache,
            &CacheConfig::default(),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn build_keeps_store_order_and_fills_excerpts() {
        let store = Arc::new(FixedStore {
            records: vec![record("b", None), record("a", Some("given"))],
            calls: AtomicUsize::new(0),
        });
        let cache = TagVersionedCache::new(Arc::new(MemoryKvStore::new()), &CacheConfig::default());
        let items = builder(store, cache).build(DEFAULT_INDEX_LIMIT).await.unwrap();

        assert_eq!(items[0].slug, "b");
        assert_eq!(items[0].excerpt.len(), 200);
        assert_eq!(items[1].excerpt, "given");
        assert_eq!(items[1].tags, vec!["rust", "cache"]);
    }

    #[tokio::test]
    async fn cached_build_is_reused_until_search_tag_is_invalidated() {
        let store = Arc::new(FixedStore {
            records: vec![record("a", None)],
            calls: AtomicUsize::new(0),
        });
        let cache = TagVersionedCache::new(Arc::new(MemoryKvStore::new()), &CacheConfig::default());
        let builder = builder(store.clone(), cache.clone());

        builder.build_cached(500).await.unwrap();
        builder.build_cached(500).await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        cache.invalidate(TAG_SEARCH).await;
        builder.build_cached(500).await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }
}
