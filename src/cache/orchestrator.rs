//! Invalidation sequencing for content mutations.
//!
//! Runs after the content store has committed a change. Steps run strictly in
//! order: bump the `search` tag, purge detail and first-page listing keys,
//! purge the public URL from the edge cache, then sync the vector index. Cache
//! steps never fail; the vector step is best effort and only reported.

use std::fmt;
use std::time::Instant;

use metrics::histogram;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::search::{SemanticSearchEngine, VectorPayload};
use crate::domain::entities::ContentRecord;

use super::config::CacheConfig;
use super::edge::EdgeResponseCache;
use super::keys::{TAG_SEARCH, content_detail_key, content_listing_key};
use super::tagged::TagVersionedCache;

const METRIC_ORCHESTRATOR_MS: &str = "edgepress_orchestrator_ms";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentChange {
    Published,
    Updated,
    Deleted,
}

impl ContentChange {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentChange::Published => "published",
            ContentChange::Updated => "updated",
            ContentChange::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ContentChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum VectorSync {
    Synced,
    /// No semantic engine configured.
    Skipped,
    Failed(String),
}

/// What one orchestrator run touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestrationReport {
    pub change: ContentChange,
    pub purged_keys: Vec<String>,
    pub purged_urls: Vec<String>,
    pub vector: VectorSync,
}

#[derive(Clone)]
pub struct CacheOrchestrator {
    cache: TagVersionedCache,
    edge: Option<EdgeResponseCache>,
    semantic: Option<SemanticSearchEngine>,
    public_base_url: String,
    listing_page_sizes: Vec<u32>,
}

impl CacheOrchestrator {
    pub fn new(
        cache: TagVersionedCache,
        edge: Option<EdgeResponseCache>,
        semantic: Option<SemanticSearchEngine>,
        public_base_url: &str,
        config: &CacheConfig,
    ) -> Self {
        Self {
            cache,
            edge,
            semantic,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            listing_page_sizes: config.listing_page_sizes.clone(),
        }
    }

    /// Canonical public URL of a post.
    pub fn content_url(&self, slug: &str) -> String {
        format!("{}/post/{slug}", self.public_base_url)
    }

    pub async fn content_published(&self, record: &ContentRecord) -> OrchestrationReport {
        self.run(ContentChange::Published, record.id, &record.slug, None, Some(record))
            .await
    }

    /// Also covers unpublishing: the record then carries `draft` status and
    /// its vector is re-stored with that status.
    pub async fn content_updated(
        &self,
        record: &ContentRecord,
        previous_slug: Option<&str>,
    ) -> OrchestrationReport {
        self.run(
            ContentChange::Updated,
            record.id,
            &record.slug,
            previous_slug,
            Some(record),
        )
        .await
    }

    pub async fn content_deleted(&self, record: &ContentRecord) -> OrchestrationReport {
        self.content_removed(record.id, &record.slug).await
    }

    /// Deletion when only the id and last slug of the record survive.
    pub async fn content_removed(&self, id: Uuid, slug: &str) -> OrchestrationReport {
        self.run(ContentChange::Deleted, id, slug, None, None).await
    }

    /// `record` is `None` only for deletions.
    async fn run(
        &self,
        change: ContentChange,
        id: Uuid,
        slug: &str,
        previous_slug: Option<&str>,
        record: Option<&ContentRecord>,
    ) -> OrchestrationReport {
        let started_at = Instant::now();
        info!(change = %change, slug, id = %id, "Content invalidation starting");

        let mut slugs = vec![slug];
        if let Some(previous) = previous_slug.filter(|previous| *previous != slug) {
            slugs.push(previous);
        }

        self.cache.invalidate(TAG_SEARCH).await;

        let mut purged_keys: Vec<String> = slugs.iter().map(|slug| content_detail_key(slug)).collect();
        purged_keys.extend(
            self.listing_page_sizes
                .iter()
                .map(|limit| content_listing_key(*limit, 0)),
        );
        for key in &purged_keys {
            self.cache.remove(key).await;
        }

        let mut purged_urls = Vec::new();
        if let Some(edge) = &self.edge {
            for url in slugs.iter().map(|slug| self.content_url(slug)) {
                edge.delete(&url).await;
                purged_urls.push(url);
            }
        }

        let vector = self.sync_vector(change, id, record).await;

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_ORCHESTRATOR_MS, "event" => change.as_str()).record(elapsed_ms);
        info!(
            change = %change,
            slug,
            keys = purged_keys.len(),
            urls = purged_urls.len(),
            vector = ?vector,
            elapsed_ms,
            "Content invalidation finished"
        );

        OrchestrationReport {
            change,
            purged_keys,
            purged_urls,
            vector,
        }
    }

    async fn sync_vector(
        &self,
        change: ContentChange,
        id: Uuid,
        record: Option<&ContentRecord>,
    ) -> VectorSync {
        let Some(semantic) = &self.semantic else {
            return VectorSync::Skipped;
        };
        let id = id.to_string();

        let result = match record {
            Some(record) if change != ContentChange::Deleted => semantic
                .upsert(&id, &VectorPayload::from(record))
                .await
                .map_err(|err| err.to_string()),
            _ => semantic.delete(&id).await.map_err(|err| err.to_string()),
        };

        match result {
            Ok(()) => VectorSync::Synced,
            Err(message) => {
                warn!(
                    change = %change,
                    id = %id,
                    error = %message,
                    "vector index sync failed; continuing"
                );
                VectorSync::Failed(message)
            }
        }
    }
}
