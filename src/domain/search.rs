//! Search index and result shapes shared by every search engine.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::entities::ContentRecord;
use crate::domain::types::ContentStatus;

/// Characters of body text used when a post has no excerpt.
pub const EXCERPT_FALLBACK_CHARS: usize = 200;

/// Compact, client-fetchable representation of one published post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexItem {
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    pub reading_time: Option<u32>,
    pub tags: Vec<String>,
}

impl SearchIndexItem {
    /// Index view of `record`. Records without a publication date have no
    /// place in the index and yield `None`.
    pub fn from_record(record: &ContentRecord) -> Option<Self> {
        let published_at = record.published_at?;
        let excerpt = match record.excerpt.as_deref() {
            Some(excerpt) => excerpt.to_string(),
            None => record.body.chars().take(EXCERPT_FALLBACK_CHARS).collect(),
        };
        Some(Self {
            slug: record.slug.clone(),
            title: record.title.clone(),
            excerpt,
            published_at,
            reading_time: record.reading_time,
            tags: record.tags.clone(),
        })
    }
}

/// A ranked hit. `score` is engine specific and not comparable across engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub item: SearchIndexItem,
    pub score: f64,
    pub highlight: String,
}

/// Metadata stored next to each vector. The vector store has no null type, so
/// absent values are carried as empty strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMetadata {
    pub status: ContentStatus,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub published_at: String,
    pub category_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticMatch {
    pub id: String,
    pub score: f64,
    #[serde(flatten)]
    pub metadata: VectorMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn index_item_uses_camel_case_wire_names() {
        let item = SearchIndexItem {
            slug: "rust-notes".into(),
            title: "Rust Notes".into(),
            excerpt: "notes".into(),
            published_at: datetime!(2024-03-01 12:00 UTC),
            reading_time: Some(4),
            tags: vec!["rust".into()],
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["publishedAt"], "2024-03-01T12:00:00Z");
        assert_eq!(value["readingTime"], 4);
    }

    fn record(excerpt: Option<&str>, body: &str) -> ContentRecord {
        ContentRecord {
            id: uuid::Uuid::new_v4(),
            slug: "post".into(),
            title: "Post".into(),
            excerpt: excerpt.map(str::to_string),
            body: body.into(),
            status: ContentStatus::Published,
            published_at: Some(datetime!(2024-01-01 0:00 UTC)),
            reading_time: Some(3),
            category_id: None,
            tags: vec!["rust".into()],
        }
    }

    #[test]
    fn from_record_falls_back_to_body_prefix() {
        let body = "é".repeat(300);
        let item = SearchIndexItem::from_record(&record(None, &body)).unwrap();
        assert_eq!(item.excerpt.chars().count(), EXCERPT_FALLBACK_CHARS);

        let item = SearchIndexItem::from_record(&record(Some("short"), &body)).unwrap();
        assert_eq!(item.excerpt, "short");
        assert_eq!(item.tags, vec!["rust".to_string()]);
    }

    #[test]
    fn from_record_requires_publication_date() {
        let mut unpublished = record(None, "body");
        unpublished.published_at = None;
        assert!(SearchIndexItem::from_record(&unpublished).is_none());
    }

    #[test]
    fn result_flattens_item_fields() {
        let result = SearchResult {
            item: SearchIndexItem {
                slug: "a".into(),
                title: "A".into(),
                excerpt: "e".into(),
                published_at: datetime!(2024-01-01 0:00 UTC),
                reading_time: None,
                tags: Vec::new(),
            },
            score: 4.0,
            highlight: "e".into(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["slug"], "a");
        assert_eq!(value["score"], 4.0);
        let back: SearchResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }
}
