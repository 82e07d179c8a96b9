//! In-memory vector index and the similarity ranking shared with the SQLite index.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::application::search::{
    VectorIndex, VectorMatch, VectorQuery, VectorRecord, VectorStoreError,
};
use crate::domain::search::VectorMetadata;

#[derive(Debug, Clone)]
struct StoredVector {
    values: Vec<f32>,
    metadata: VectorMetadata,
}

/// Brute-force cosine-similarity index. Vectors must share one dimension;
/// the first upsert fixes it.
#[derive(Debug, Default)]
pub struct MemoryVectorIndex {
    vectors: DashMap<String, StoredVector>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn dimension(&self) -> Option<usize> {
        self.vectors.iter().next().map(|entry| entry.values.len())
    }
}

pub(crate) fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut left_norm = 0.0f64;
    let mut right_norm = 0.0f64;
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

/// Highest score first, ties by id, truncated to `top_k`.
pub(crate) fn rank_matches(
    candidates: Vec<(String, f64, Option<VectorMetadata>)>,
    top_k: usize,
) -> Vec<VectorMatch> {
    let mut matches: Vec<VectorMatch> = candidates
        .into_iter()
        .map(|(id, score, metadata)| VectorMatch {
            id,
            score,
            metadata,
        })
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    matches.truncate(top_k);
    matches
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
        let expected = self
            .dimension()
            .or_else(|| records.first().map(|record| record.values.len()));
        for record in records {
            if Some(record.values.len()) != expected {
                return Err(VectorStoreError::backend(format!(
                    "vector `{}` has dimension {}, index expects {}",
                    record.id,
                    record.values.len(),
                    expected.unwrap_or_default()
                )));
            }
            self.vectors.insert(
                record.id,
                StoredVector {
                    values: record.values,
                    metadata: record.metadata,
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        query: VectorQuery,
    ) -> Result<Vec<VectorMatch>, VectorStoreError> {
        if let Some(dimension) = self.dimension().filter(|dimension| *dimension != vector.len()) {
            return Err(VectorStoreError::backend(format!(
                "query has dimension {}, index expects {dimension}",
                vector.len()
            )));
        }

        let candidates = self
            .vectors
            .iter()
            .filter(|entry| {
                query
                    .status
                    .is_none_or(|status| entry.metadata.status == status)
            })
            .map(|entry| {
                (
                    entry.key().clone(),
                    cosine_similarity(vector, &entry.values),
                    Some(entry.metadata.clone()),
                )
            })
            .collect();

        Ok(rank_matches(candidates, query.top_k))
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), VectorStoreError> {
        for id in ids {
            self.vectors.remove(id);
        }
        Ok(())
    }
}
