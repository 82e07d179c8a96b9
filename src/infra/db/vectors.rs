use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use tracing::warn;

use crate::application::search::{
    VectorIndex, VectorMatch, VectorQuery, VectorRecord, VectorStoreError,
};
use crate::domain::search::VectorMetadata;
use crate::infra::vectors::{cosine_similarity, rank_matches};

/// Vector index persisted in `content_vectors`, so a `reindex` run and the
/// server see the same vectors. Queries scan the status-filtered rows and
/// rank them in process.
#[derive(Clone)]
pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn stored_dimension(&self) -> Result<Option<i64>, VectorStoreError> {
        sqlx::query_scalar("SELECT dimension FROM content_vectors LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| VectorStoreError::backend(err.to_string()))
    }
}

#[derive(sqlx::FromRow)]
struct VectorRow {
    id: String,
    vector: String,
    metadata: String,
}

/// A row whose vector is unreadable fails the query. Unreadable metadata only
/// loses that row's metadata, so the match is dropped downstream.
fn decode_row(
    row: VectorRow,
) -> Result<(String, Vec<f32>, Option<VectorMetadata>), VectorStoreError> {
    let values: Vec<f32> = serde_json::from_str(&row.vector).map_err(|err| {
        VectorStoreError::backend(format!("vector `{}` is not readable: {err}", row.id))
    })?;
    let metadata = match serde_json::from_str::<VectorMetadata>(&row.metadata) {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            warn!(id = %row.id, error = %err, "vector metadata unreadable; match will be dropped");
            None
        }
    };
    Ok((row.id, values, metadata))
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
        let backend = |err: sqlx::Error| VectorStoreError::backend(err.to_string());
        let expected = self
            .stored_dimension()
            .await?
            .or_else(|| records.first().map(|record| record.values.len() as i64));

        let mut tx = self.pool.begin().await.map_err(backend)?;
        for record in records {
            let dimension = record.values.len() as i64;
            if Some(dimension) != expected {
                return Err(VectorStoreError::backend(format!(
                    "vector `{}` has dimension {dimension}, index expects {}",
                    record.id,
                    expected.unwrap_or_default()
                )));
            }
            let vector = serde_json::to_string(&record.values)
                .map_err(|err| VectorStoreError::backend(err.to_string()))?;
            let metadata = serde_json::to_string(&record.metadata)
                .map_err(|err| VectorStoreError::backend(err.to_string()))?;

            sqlx::query(
                "INSERT INTO content_vectors (id, vector, dimension, status, metadata) \
                 VALUES (?, ?, ?, ?, ?) \
                 ON CONFLICT(id) DO UPDATE SET vector = excluded.vector, \
                     dimension = excluded.dimension, status = excluded.status, \
                     metadata = excluded.metadata",
            )
            .bind(&record.id)
            .bind(vector)
            .bind(dimension)
            .bind(record.metadata.status.as_str())
            .bind(metadata)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)
    }

    async fn query(
        &self,
        vector: &[f32],
        query: VectorQuery,
    ) -> Result<Vec<VectorMatch>, VectorStoreError> {
        let rows = match query.status {
            Some(status) => {
                sqlx::query_as::<_, VectorRow>(
                    "SELECT id, vector, metadata FROM content_vectors WHERE status = ?",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, VectorRow>("SELECT id, vector, metadata FROM content_vectors")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|err| VectorStoreError::backend(err.to_string()))?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let (id, values, metadata) = decode_row(row)?;
            if values.len() != vector.len() {
                return Err(VectorStoreError::backend(format!(
                    "query has dimension {}, index expects {}",
                    vector.len(),
                    values.len()
                )));
            }
            candidates.push((id, cosine_similarity(vector, &values), metadata));
        }

        Ok(rank_matches(candidates, query.top_k))
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), VectorStoreError> {
        for id in ids {
            sqlx::query("DELETE FROM content_vectors WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|err| VectorStoreError::backend(err.to_string()))?;
        }
        Ok(())
    }
}
