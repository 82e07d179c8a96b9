//! Embedding-backed semantic search.
//!
//! Unlike the KV cache this path has no fallback data source: embedding and
//! vector store failures, timeouts included, are returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, instrument, warn};

use crate::domain::entities::ContentRecord;
use crate::domain::search::{SemanticMatch, VectorMetadata};
use crate::domain::types::ContentStatus;

use super::error::{EmbeddingError, SemanticSearchError, VectorStoreError};

pub const EMBEDDING_MODEL: &str = "@cf/baai/bge-base-en-v1.5";
/// Character budget for one embedding input.
pub const MAX_EMBEDDING_INPUT_CHARS: usize = 12_000;
pub const MAX_SEARCH_RESULTS: usize = 20;
pub const DEFAULT_SEMANTIC_LIMIT: usize = 5;

/// Raw provider answer. Only `data[0].embedding` is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    #[serde(default)]
    pub data: Vec<EmbeddingData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingData {
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse, EmbeddingError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorQuery {
    pub top_k: usize,
    /// Only return vectors whose metadata carries this status.
    pub status: Option<ContentStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f64,
    pub metadata: Option<VectorMetadata>,
}

/// Nearest-neighbour store. Higher scores are closer.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError>;

    async fn query(
        &self,
        vector: &[f32],
        query: VectorQuery,
    ) -> Result<Vec<VectorMatch>, VectorStoreError>;

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), VectorStoreError>;
}

/// Content and metadata needed to embed and store one post.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPayload {
    pub id: String,
    pub status: ContentStatus,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub published_at: Option<String>,
    pub category_id: Option<String>,
    pub body: String,
}

impl From<&ContentRecord> for VectorPayload {
    fn from(record: &ContentRecord) -> Self {
        Self {
            id: record.id.to_string(),
            status: record.status,
            slug: record.slug.clone(),
            title: record.title.clone(),
            excerpt: record.excerpt.clone(),
            published_at: record
                .published_at
                .and_then(|published| published.format(&Rfc3339).ok()),
            category_id: record.category_id.clone(),
            body: record.body.clone(),
        }
    }
}

impl VectorPayload {
    /// Metadata as stored next to the vector; absent values become `""`.
    pub fn metadata(&self) -> VectorMetadata {
        VectorMetadata {
            status: self.status,
            slug: self.slug.clone(),
            title: self.title.clone(),
            excerpt: self.excerpt.clone().unwrap_or_default(),
            published_at: self.published_at.clone().unwrap_or_default(),
            category_id: self.category_id.clone().unwrap_or_default(),
        }
    }
}

/// Title, excerpt and body separated by blank lines, empty parts skipped,
/// cut to [`MAX_EMBEDDING_INPUT_CHARS`] characters.
pub fn build_embedding_input(payload: &VectorPayload) -> String {
    let sections = [
        payload.title.as_str(),
        payload.excerpt.as_deref().unwrap_or_default(),
        payload.body.as_str(),
    ];
    let joined = sections
        .iter()
        .filter(|section| !section.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n");

    match joined.char_indices().nth(MAX_EMBEDDING_INPUT_CHARS) {
        Some((cut, _)) => joined[..cut].to_string(),
        None => joined,
    }
}

pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_SEARCH_RESULTS)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexSummary {
    pub indexed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct SemanticSearchEngine {
    embeddings: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    timeout: Duration,
}

impl SemanticSearchEngine {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        timeout: Duration,
    ) -> Self {
        Self {
            embeddings,
            index,
            timeout,
        }
    }

    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = tokio::time::timeout(self.timeout, self.embeddings.embed(text))
            .await
            .map_err(|_| EmbeddingError::Timeout {
                elapsed_ms: self.elapsed_ms(),
            })??;

        response
            .data
            .into_iter()
            .next()
            .and_then(|data| data.embedding)
            .filter(|vector| !vector.is_empty())
            .ok_or(EmbeddingError::MissingVector)
    }

    #[instrument(skip(self, payload), fields(slug = %payload.slug))]
    pub async fn upsert(&self, id: &str, payload: &VectorPayload) -> Result<(), SemanticSearchError> {
        let vector = self
            .generate_embedding(&build_embedding_input(payload))
            .await?;
        let record = VectorRecord {
            id: id.to_string(),
            values: vector,
            metadata: payload.metadata(),
        };
        self.bounded(self.index.upsert(vec![record])).await?;
        debug!(id, "vector upserted");
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), VectorStoreError> {
        self.bounded(self.index.delete_by_ids(&[id.to_string()]))
            .await?;
        debug!(id, "vector deleted");
        Ok(())
    }

    /// Nearest published matches for `query`; drafts too when asked.
    ///
    /// `limit` is clamped to `1..=20`. Matches without stored metadata are
    /// skipped.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        include_drafts: bool,
    ) -> Result<Vec<SemanticMatch>, SemanticSearchError> {
        let top_k = clamp_limit(limit);
        let vector = self.generate_embedding(query).await?;
        let filter = VectorQuery {
            top_k,
            status: (!include_drafts).then_some(ContentStatus::Published),
        };
        let matches = self.bounded(self.index.query(&vector, filter)).await?;

        Ok(matches
            .into_iter()
            .filter_map(|found| {
                found.metadata.map(|metadata| SemanticMatch {
                    id: found.id,
                    score: found.score,
                    metadata,
                })
            })
            .collect())
    }

    /// Re-embed every record with its current status. Failures are counted
    /// and the run moves on to the next record.
    #[instrument(skip_all, fields(total = records.len()))]
    pub async fn reindex(&self, records: &[ContentRecord]) -> ReindexSummary {
        let mut summary = ReindexSummary::default();
        for record in records {
            let id = record.id.to_string();
            match self.upsert(&id, &VectorPayload::from(record)).await {
                Ok(()) => summary.indexed += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(id = %id, slug = %record.slug, error = %err, "vector backfill failed");
                }
            }
        }
        info!(indexed = summary.indexed, failed = summary.failed, "vector backfill finished");
        summary
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, VectorStoreError>>,
    ) -> Result<T, VectorStoreError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| VectorStoreError::Timeout {
                elapsed_ms: self.elapsed_ms(),
            })?
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;

    struct FixedEmbeddings(EmbeddingResponse);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbeddings {
        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse, EmbeddingError> {
            Ok(self.0.clone())
        }
    }

    fn unit_embeddings() -> Arc<FixedEmbeddings> {
        Arc::new(FixedEmbeddings(EmbeddingResponse {
            data: vec![EmbeddingData {
                embedding: Some(vec![1.0, 0.0]),
            }],
        }))
    }

    #[derive(Default)]
    struct RecordingIndex {
        upserts: Mutex<Vec<VectorRecord>>,
        queries: Mutex<Vec<VectorQuery>>,
        deleted: Mutex<Vec<String>>,
        matches: Vec<VectorMatch>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
            self.upserts.lock().unwrap().extend(records);
            Ok(())
        }

        async fn query(
            &self,
            _vector: &[f32],
            query: VectorQuery,
        ) -> Result<Vec<VectorMatch>, VectorStoreError> {
            self.queries.lock().unwrap().push(query);
            Ok(self.matches.clone())
        }

        async fn delete_by_ids(&self, ids: &[String]) -> Result<(), VectorStoreError> {
            self.deleted.lock().unwrap().extend(ids.iter().cloned());
            Ok(())
        }
    }

    fn payload() -> VectorPayload {
        VectorPayload::from(&ContentRecord {
            id: Uuid::nil(),
            slug: "hello".into(),
            title: "Hello".into(),
            excerpt: None,
            body: "Body text".into(),
            status: ContentStatus::Published,
            published_at: Some(datetime!(2024-06-01 8:30 UTC)),
            reading_time: None,
            category_id: None,
            tags: Vec::new(),
        })
    }

    fn metadata(slug: &str) -> VectorMetadata {
        VectorMetadata {
            status: ContentStatus::Published,
            slug: slug.into(),
            title: slug.into(),
            excerpt: String::new(),
            published_at: String::new(),
            category_id: String::new(),
        }
    }

    #[test]
    fn embedding_input_skips_empty_sections_and_truncates() {
        let mut payload = payload();
        assert_eq!(build_embedding_input(&payload), "Hello\n\nBody text");

        payload.excerpt = Some("Short".into());
        assert_eq!(build_embedding_input(&payload), "Hello\n\nShort\n\nBody text");

        payload.body = "ü".repeat(20_000);
        let input = build_embedding_input(&payload);
        assert_eq!(input.chars().count(), MAX_EMBEDDING_INPUT_CHARS);
        assert!(input.starts_with("Hello\n\nShort\n\n"));
    }

    #[test]
    fn limits_clamp_to_supported_range() {
        assert_eq!(clamp_limit(999), MAX_SEARCH_RESULTS);
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(7), 7);
    }

    #[tokio::test]
    async fn missing_vector_is_an_embedding_error() {
        let engine = SemanticSearchEngine::new(
            Arc::new(FixedEmbeddings(EmbeddingResponse::default())),
            Arc::new(RecordingIndex::default()),
            Duration::from_secs(1),
        );
        let err = engine.generate_embedding("text").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::MissingVector));

        let err = engine.search("text", 5, false).await.unwrap_err();
        assert!(matches!(
            err,
            SemanticSearchError::Embedding(EmbeddingError::MissingVector)
        ));
    }

    #[tokio::test]
    async fn upsert_coerces_absent_metadata_to_empty_strings() {
        let index = Arc::new(RecordingIndex::default());
        let engine = SemanticSearchEngine::new(unit_embeddings(), index.clone(), Duration::from_secs(1));
        let payload = payload();
        engine.upsert(&payload.id, &payload).await.unwrap();

        let upserts = index.upserts.lock().unwrap();
        let stored = &upserts[0];
        assert_eq!(stored.id, Uuid::nil().to_string());
        assert_eq!(stored.values, vec![1.0, 0.0]);
        assert_eq!(stored.metadata.excerpt, "");
        assert_eq!(stored.metadata.category_id, "");
        assert_eq!(stored.metadata.published_at, "2024-06-01T08:30:00Z");
    }

    #[tokio::test]
    async fn search_clamps_filters_and_drops_matches_without_metadata() {
        let index = Arc::new(RecordingIndex {
            matches: vec![
                VectorMatch {
                    id: "1".into(),
                    score: 0.9,
                    metadata: Some(metadata("kept")),
                },
                VectorMatch {
                    id: "2".into(),
                    score: 0.8,
                    metadata: None,
                },
            ],
            ..Default::default()
        });
        let engine = SemanticSearchEngine::new(unit_embeddings(), index.clone(), Duration::from_secs(1));

        let results = engine.search("hello", 999, false).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.slug, "kept");

        engine.search("hello", 0, true).await.unwrap();
        let queries = index.queries.lock().unwrap();
        assert_eq!(
            queries[0],
            VectorQuery {
                top_k: 20,
                status: Some(ContentStatus::Published)
            }
        );
        assert_eq!(
            queries[1],
            VectorQuery {
                top_k: 1,
                status: None
            }
        );
    }

    #[tokio::test]
    async fn delete_removes_by_id() {
        let index = Arc::new(RecordingIndex::default());
        let engine = SemanticSearchEngine::new(unit_embeddings(), index.clone(), Duration::from_secs(1));
        engine.delete("abc").await.unwrap();
        assert_eq!(index.deleted.lock().unwrap().as_slice(), &["abc".to_string()]);
    }

    #[tokio::test]
    async fn reindex_counts_failures_and_keeps_going() {
        let index = Arc::new(RecordingIndex::default());
        let engine = SemanticSearchEngine::new(unit_embeddings(), index.clone(), Duration::from_secs(1));
        let mut draft = ContentRecord {
            id: Uuid::new_v4(),
            slug: "draft".into(),
            title: "Draft".into(),
            excerpt: None,
            body: "Unfinished".into(),
            status: ContentStatus::Draft,
            published_at: None,
            reading_time: None,
            category_id: None,
            tags: Vec::new(),
        };
        let mut published = draft.clone();
        published.id = Uuid::new_v4();
        published.slug = "live".into();
        published.status = ContentStatus::Published;

        let summary = engine.reindex(&[draft.clone(), published]).await;
        assert_eq!(summary, ReindexSummary { indexed: 2, failed: 0 });
        let statuses: Vec<_> = index
            .upserts
            .lock()
            .unwrap()
            .iter()
            .map(|record| record.metadata.status)
            .collect();
        assert_eq!(statuses, vec![ContentStatus::Draft, ContentStatus::Published]);

        let broken = SemanticSearchEngine::new(
            Arc::new(FixedEmbeddings(EmbeddingResponse::default())),
            index,
            Duration::from_secs(1),
        );
        draft.title = "Still a draft".into();
        let summary = broken.reindex(&[draft]).await;
        assert_eq!(summary, ReindexSummary { indexed: 0, failed: 1 });
    }

    struct StalledIndex;

    #[async_trait]
    impl VectorIndex for StalledIndex {
        async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
            std::future::pending().await
        }

        async fn query(
            &self,
            _vector: &[f32],
            _query: VectorQuery,
        ) -> Result<Vec<VectorMatch>, VectorStoreError> {
            std::future::pending().await
        }

        async fn delete_by_ids(&self, _ids: &[String]) -> Result<(), VectorStoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn vector_timeouts_surface_as_errors() {
        let engine = SemanticSearchEngine::new(
            unit_embeddings(),
            Arc::new(StalledIndex),
            Duration::from_millis(10),
        );
        let err = engine.search("hello", 5, false).await.unwrap_err();
        assert!(matches!(
            err,
            SemanticSearchError::VectorStore(VectorStoreError::Timeout { .. })
        ));
    }
}
