//! Server-side ranked full-text search.
//!
//! The backend ranks with BM25, where a lower score means a better match.
//! Results are therefore sorted ascending. A backend with the opposite
//! convention needs the comparator in [`rank_ascending`] flipped.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::application::repos::{FullTextBackend, FullTextHit};
use crate::cache::{CacheConfig, TagVersionedCache, fulltext_key, normalize_fulltext_query};
use crate::domain::search::{SearchIndexItem, SearchResult};

use super::error::SearchBackendError;

pub const DEFAULT_FULLTEXT_LIMIT: u32 = 20;

/// Turn free text into an implicit-AND prefix expression: `rust axum` becomes
/// `rust* axum*`. Quote characters are stripped. `None` when nothing is left,
/// so callers never send an unconstrained match.
pub fn build_match_expression(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|token| token.replace(['"', '\''], ""))
        .filter(|token| !token.is_empty())
        .map(|token| format!("{token}*"))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

fn rank_ascending(left: &SearchResult, right: &SearchResult) -> Ordering {
    left.score
        .total_cmp(&right.score)
        .then_with(|| left.item.slug.cmp(&right.item.slug))
}

#[derive(Clone)]
pub struct FullTextSearchEngine {
    backend: Arc<dyn FullTextBackend>,
    cache: TagVersionedCache,
    ttl: Duration,
    timeout: Duration,
}

impl FullTextSearchEngine {
    pub fn new(
        backend: Arc<dyn FullTextBackend>,
        cache: TagVersionedCache,
        config: &CacheConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            cache,
            ttl: config.fulltext_ttl(),
            timeout,
        }
    }

    #[instrument(skip(self))]
    pub async fn search(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SearchResult>, SearchBackendError> {
        let Some(expression) = build_match_expression(query) else {
            debug!("query reduced to no tokens");
            return Ok(Vec::new());
        };

        let hits = tokio::time::timeout(
            self.timeout,
            self.backend.match_published(&expression, limit),
        )
        .await
        .map_err(|_| SearchBackendError::Timeout {
            elapsed_ms: self.timeout.as_millis() as u64,
        })??;

        let mut results: Vec<SearchResult> = hits.into_iter().filter_map(into_result).collect();
        results.sort_by(rank_ascending);
        results.truncate(limit as usize);
        debug!(expression = %expression, results = results.len(), "full-text search finished");
        Ok(results)
    }

    /// [`Self::search`] fronted by a short-lived, untagged KV entry per query.
    pub async fn search_cached(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SearchResult>, SearchBackendError> {
        let normalized = normalize_fulltext_query(query);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let key = fulltext_key(&normalized, limit as usize);
        self.cache
            .get_or_load(&key, None, self.ttl, || self.search(&normalized, limit))
            .await
    }
}

fn into_result(hit: FullTextHit) -> Option<SearchResult> {
    let item = SearchIndexItem::from_record(&hit.record)?;
    let highlight = hit
        .snippet
        .filter(|snippet| !snippet.is_empty())
        .unwrap_or_else(|| item.excerpt.clone());
    Some(SearchResult {
        item,
        score: hit.rank,
        highlight,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use async_trait::async_trait;
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::application::repos::RepoError;
    use crate::cache::MemoryKvStore;
    use crate::domain::entities::ContentRecord;
    use crate::domain::types::ContentStatus;

    #[derive(Default)]
    struct RecordingBackend {
        hits: Vec<FullTextHit>,
        expressions: Mutex<Vec<String>>,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl FullTextBackend for RecordingBackend {
        async fn match_published(
            &self,
            expression: &str,
            _limit: u32,
        ) -> Result<Vec<FullTextHit>, RepoError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.expressions.lock().unwrap().push(expression.to_string());
            if self.fail {
                return Err(RepoError::InvalidInput {
                    message: "fts5: syntax error".into(),
                });
            }
            Ok(self.hits.clone())
        }
    }

    fn hit(slug: &str, rank: f64, snippet: Option<&str>) -> FullTextHit {
        FullTextHit {
            record: ContentRecord {
                id: Uuid::new_v4(),
                slug: slug.into(),
                title: slug.into(),
                excerpt: Some(format!("{slug} excerpt")),
                body: "body".into(),
                status: ContentStatus::Published,
                published_at: Some(datetime!(2024-01-01 0:00 UTC)),
                reading_time: None,
                category_id: None,
                tags: Vec::new(),
            },
            rank,
            snippet: snippet.map(str::to_string),
        }
    }

    fn engine(backend: Arc<RecordingBackend>) -> FullTextSearchEngine {
        let cache = TagVersionedCache::new(Arc::new(MemoryKvStore::new()), &CacheConfig::default());
        FullTextSearchEngine::new(backend, cache, &CacheConfig::default(), Duration::from_secs(1))
    }

    #[test]
    fn match_expression_prefixes_and_strips_quotes() {
        assert_eq!(
            build_match_expression(" \"rust\"  it's axum ").as_deref(),
            Some("rust* its* axum*")
        );
        assert_eq!(build_match_expression("\"\""), None);
        assert_eq!(build_match_expression("' \" '"), None);
        assert_eq!(build_match_expression(""), None);
    }

    #[tokio::test]
    async fn quote_only_query_never_reaches_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let results = engine(backend.clone()).search("\"\"", 20).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(backend.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lower_rank_sorts_first() {
        let backend = Arc::new(RecordingBackend {
            hits: vec![hit("weak", -0.5, None), hit("strong", -7.25, Some("…match…"))],
            ..Default::default()
        });
        let results = engine(backend.clone()).search("rust", 20).await.unwrap();
        let slugs: Vec<_> = results.iter().map(|r| r.item.slug.as_str()).collect();
        assert_eq!(slugs, vec!["strong", "weak"]);
        assert_eq!(results[0].highlight, "…match…");
        assert_eq!(results[1].highlight, "weak excerpt");
        assert_eq!(
            backend.expressions.lock().unwrap().as_slice(),
            &["rust*".to_string()]
        );
    }

    #[tokio::test]
    async fn equal_ranks_fall_back_to_slug_order() {
        let backend = Arc::new(RecordingBackend {
            hits: vec![hit("zeta", -2.0, None), hit("alpha", -2.0, None), hit("best", -3.0, None)],
            ..Default::default()
        });
        let results = engine(backend).search("rust", 20).await.unwrap();
        let slugs: Vec<_> = results.iter().map(|r| r.item.slug.as_str()).collect();
        assert_eq!(slugs, vec!["best", "alpha", "zeta"]);
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let backend = Arc::new(RecordingBackend {
            fail: true,
            ..Default::default()
        });
        let err = engine(backend).search("rust", 20).await.unwrap_err();
        assert!(matches!(err, SearchBackendError::Query { .. }));
    }

    #[tokio::test]
    async fn cached_search_normalizes_and_reuses_results() {
        let backend = Arc::new(RecordingBackend {
            hits: vec![hit("a", -1.0, None)],
            ..Default::default()
        });
        let engine = engine(backend.clone());
        engine.search_cached("  Rust ", 20).await.unwrap();
        engine.search_cached("rust", 20).await.unwrap();
        assert_eq!(backend.calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(
            backend.expressions.lock().unwrap().as_slice(),
            &["rust*".to_string()]
        );

        assert!(engine.search_cached("   ", 20).await.unwrap().is_empty());
        assert_eq!(backend.calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_search_does_not_cache_failures() {
        let backend = Arc::new(RecordingBackend {
            fail: true,
            ..Default::default()
        });
        let engine = engine(backend.clone());
        assert!(engine.search_cached("rust", 20).await.is_err());
        assert!(engine.search_cached("rust", 20).await.is_err());
        assert_eq!(backend.calls.load(AtomicOrdering::SeqCst), 2);
    }
}
