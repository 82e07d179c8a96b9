#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use edgepress::application::search::{
    EmbeddingData, EmbeddingError, EmbeddingProvider, EmbeddingResponse,
};
use edgepress::domain::entities::ContentRecord;
use edgepress::domain::types::ContentStatus;
use edgepress::infra::db::SqliteRepositories;
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// A migrated SQLite database in a temporary directory. The directory lives
/// as long as this value.
pub struct TestDb {
    _dir: TempDir,
    pub repos: Arc<SqliteRepositories>,
}

pub async fn open_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("edgepress.db").display());
    let pool = SqliteRepositories::connect(&url, 4)
        .await
        .expect("open sqlite database");
    SqliteRepositories::run_migrations(&pool)
        .await
        .expect("apply migrations");
    TestDb {
        _dir: dir,
        repos: Arc::new(SqliteRepositories::new(pool)),
    }
}

/// A published post dated `hours_ago` hours in the past.
pub fn post(slug: &str, title: &str, body: &str, tags: &[&str], hours_ago: i64) -> ContentRecord {
    ContentRecord {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        title: title.to_string(),
        excerpt: None,
        body: body.to_string(),
        status: ContentStatus::Published,
        published_at: Some(OffsetDateTime::now_utc() - Duration::hours(hours_ago)),
        reading_time: Some(3),
        category_id: None,
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    }
}

/// Embeds text as `[mentions rust, mentions cache, 0.1]`, enough to tell
/// topics apart without a model.
pub struct KeywordEmbeddings;

#[async_trait]
impl EmbeddingProvider for KeywordEmbeddings {
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse, EmbeddingError> {
        let text = text.to_lowercase();
        let flag = |word: &str| if text.contains(word) { 1.0 } else { 0.0 };
        Ok(EmbeddingResponse {
            data: vec![EmbeddingData {
                embedding: Some(vec![flag("rust"), flag("cache"), 0.1]),
            }],
        })
    }
}
