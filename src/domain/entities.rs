//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::ContentStatus;

/// A post as the content store hands it out, with its tag names flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub body: String,
    pub status: ContentStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    pub reading_time: Option<u32>,
    pub category_id: Option<String>,
    pub tags: Vec<String>,
}

impl ContentRecord {
    /// Published and not scheduled into the future.
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.status == ContentStatus::Published
            && self.published_at.is_some_and(|published| published <= now)
    }
}
