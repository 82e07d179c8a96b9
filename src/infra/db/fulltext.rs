use async_trait::async_trait;

use crate::application::repos::{FullTextBackend, FullTextHit, RepoError};

use super::SqliteRepositories;
use super::content::{CONTENT_COLUMNS, LIVE_CONDITION, now_timestamp};
use super::types::FullTextRow;
use crate::infra::db::map_sqlx_error;

// Snippets come from the body column (index 1), unmarked, eight tokens wide.
const MATCH_SUBQUERY: &str = "SELECT rowid, bm25(content_fts) AS score, \
     snippet(content_fts, 1, '', '', ' … ', 8) AS snippet \
     FROM content_fts WHERE content_fts MATCH ?";

#[async_trait]
impl FullTextBackend for SqliteRepositories {
    async fn match_published(
        &self,
        expression: &str,
        limit: u32,
    ) -> Result<Vec<FullTextHit>, RepoError> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS}, m.score, m.snippet \
             FROM ({MATCH_SUBQUERY}) AS m \
             INNER JOIN content c ON c.rowid = m.rowid \
             WHERE {LIVE_CONDITION} \
             ORDER BY m.score ASC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, FullTextRow>(&sql)
            .bind(expression)
            .bind(now_timestamp()?)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(FullTextHit::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    use super::*;
    use crate::domain::entities::ContentRecord;
    use crate::domain::types::ContentStatus;
    use crate::infra::db::test_support::memory_repositories;

    fn record(slug: &str, title: &str, body: &str, status: ContentStatus) -> ContentRecord {
        ContentRecord {
            id: Uuid::new_v4(),
            slug: slug.into(),
            title: title.into(),
            excerpt: None,
            body: body.into(),
            status,
            published_at: Some(OffsetDateTime::now_utc() - Duration::hours(1)),
            reading_time: None,
            category_id: None,
            tags: vec!["notes".into()],
        }
    }

    #[tokio::test]
    async fn prefix_match_returns_live_hits_with_snippets() {
        let repos = memory_repositories().await;
        repos
            .save_content(&record(
                "edge",
                "Edge caching",
                "Caching responses at the edge keeps latency low for readers.",
                ContentStatus::Published,
            ))
            .await
            .unwrap();
        repos
            .save_content(&record(
                "draft",
                "Caching drafts",
                "Caching drafts should never be visible.",
                ContentStatus::Draft,
            ))
            .await
            .unwrap();

        let hits = repos.match_published("cach*", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.slug, "edge");
        assert_eq!(hits[0].record.tags, vec!["notes"]);
        assert!(hits[0].snippet.as_deref().is_some_and(|s| s.contains("Caching")));
    }

    #[tokio::test]
    async fn hits_follow_bm25_order() {
        let repos = memory_repositories().await;
        repos
            .save_content(&record(
                "weak",
                "Weekly notes",
                "A long post that mentions sqlite once among many other words about gardening, \
                 weather, cooking and travel plans for the coming season.",
                ContentStatus::Published,
            ))
            .await
            .unwrap();
        repos
            .save_content(&record(
                "strong",
                "SQLite tips",
                "sqlite sqlite sqlite",
                ContentStatus::Published,
            ))
            .await
            .unwrap();

        let hits = repos.match_published("sqlite*", 10).await.unwrap();
        let slugs: Vec<_> = hits.iter().map(|hit| hit.record.slug.as_str()).collect();
        assert_eq!(slugs, vec!["strong", "weak"]);
        assert!(hits[0].rank <= hits[1].rank);

        let limited = repos.match_published("sqlite*", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn updates_and_deletes_reach_the_index() {
        let repos = memory_repositories().await;
        let mut post = record("moving", "Original title", "plain body", ContentStatus::Published);
        repos.save_content(&post).await.unwrap();

        post.title = "Renamed heading".into();
        repos.save_content(&post).await.unwrap();
        assert!(repos.match_published("original*", 10).await.unwrap().is_empty());
        assert_eq!(repos.match_published("renamed*", 10).await.unwrap().len(), 1);

        repos.delete_content(post.id).await.unwrap();
        assert!(repos.match_published("renamed*", 10).await.unwrap().is_empty());
    }
}
