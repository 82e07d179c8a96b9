use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::application::repos::{ContentStore, RepoError};
use crate::domain::entities::ContentRecord;

use super::SqliteRepositories;
use super::types::{ContentRow, format_timestamp};
use crate::infra::db::map_sqlx_error;

pub(crate) const CONTENT_COLUMNS: &str = "c.id, c.slug, c.title, c.excerpt, c.body, c.status, \
     c.published_at, c.reading_time, c.category_id, \
     (SELECT GROUP_CONCAT(t.name, '|') FROM content_tags ct \
      INNER JOIN tags t ON t.id = ct.tag_id WHERE ct.content_id = c.id) AS tags";

pub(crate) const LIVE_CONDITION: &str =
    "c.status = 'published' AND c.published_at IS NOT NULL AND c.published_at <= ?";

pub(crate) fn now_timestamp() -> Result<String, RepoError> {
    format_timestamp(OffsetDateTime::now_utc()).map_err(|err| RepoError::integrity(err.to_string()))
}

fn into_records(rows: Vec<ContentRow>) -> Result<Vec<ContentRecord>, RepoError> {
    rows.into_iter().map(ContentRecord::try_from).collect()
}

impl SqliteRepositories {
    /// Insert or replace a record together with its tag links.
    ///
    /// Content mutations normally happen outside this service; this write
    /// path exists for seeding and tooling. Callers run the cache
    /// orchestrator after it returns.
    #[instrument(skip(self, record), fields(slug = %record.slug))]
    pub async fn save_content(&self, record: &ContentRecord) -> Result<(), RepoError> {
        let published_at = record
            .published_at
            .map(format_timestamp)
            .transpose()
            .map_err(|err| RepoError::InvalidInput {
                message: err.to_string(),
            })?;
        let id = record.id.to_string();
        let now = now_timestamp()?;

        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO content (id, slug, title, excerpt, body, status, published_at, \
             reading_time, category_id, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                 slug = excluded.slug, title = excluded.title, excerpt = excluded.excerpt, \
                 body = excluded.body, status = excluded.status, \
                 published_at = excluded.published_at, reading_time = excluded.reading_time, \
                 category_id = excluded.category_id, updated_at = excluded.updated_at",
        )
        .bind(&id)
        .bind(&record.slug)
        .bind(&record.title)
        .bind(record.excerpt.as_deref())
        .bind(&record.body)
        .bind(record.status.as_str())
        .bind(published_at)
        .bind(record.reading_time.map(i64::from))
        .bind(record.category_id.as_deref())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM content_tags WHERE content_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for name in record.tags.iter().filter(|name| !name.trim().is_empty()) {
            sqlx::query("INSERT INTO tags (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
                .bind(name)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            sqlx::query(
                "INSERT OR IGNORE INTO content_tags (content_id, tag_id) \
                 SELECT ?, id FROM tags WHERE name = ?",
            )
            .bind(&id)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    /// Returns the removed record so the caller can hand it to the
    /// orchestrator.
    #[instrument(skip(self))]
    pub async fn delete_content(&self, id: Uuid) -> Result<Option<ContentRecord>, RepoError> {
        let existing = self.content_by_id(id).await?;
        if existing.is_some() {
            sqlx::query("DELETE FROM content WHERE id = ?")
                .bind(id.to_string())
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(existing)
    }
}

#[async_trait]
impl ContentStore for SqliteRepositories {
    async fn published_content(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ContentRecord>, RepoError> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content c WHERE {LIVE_CONDITION} \
             ORDER BY c.published_at DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(now_timestamp()?)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        into_records(rows)
    }

    async fn content_by_id(&self, id: Uuid) -> Result<Option<ContentRecord>, RepoError> {
        let sql = format!("SELECT {CONTENT_COLUMNS} FROM content c WHERE c.id = ?");
        sqlx::query_as::<_, ContentRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(ContentRecord::try_from)
            .transpose()
    }

    async fn content_by_slug(&self, slug: &str) -> Result<Option<ContentRecord>, RepoError> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content c WHERE c.slug = ? AND {LIVE_CONDITION}"
        );
        sqlx::query_as::<_, ContentRow>(&sql)
            .bind(slug)
            .bind(now_timestamp()?)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(ContentRecord::try_from)
            .transpose()
    }

    async fn all_content(&self) -> Result<Vec<ContentRecord>, RepoError> {
        let sql = format!("SELECT {CONTENT_COLUMNS} FROM content c ORDER BY c.slug");
        let rows = sqlx::query_as::<_, ContentRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        into_records(rows)
    }
}
