//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::ContentRecord;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

/// Read side of the content store.
///
/// Public reads only ever see content that is published and not dated in the
/// future. Lists are ordered by `published_at` descending; ties keep the
/// store's row order.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn published_content(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ContentRecord>, RepoError>;

    /// Any status. Used by mutation paths and vector backfill.
    async fn content_by_id(&self, id: Uuid) -> Result<Option<ContentRecord>, RepoError>;

    /// Published, non-future content only.
    async fn content_by_slug(&self, slug: &str) -> Result<Option<ContentRecord>, RepoError>;

    /// Every record regardless of status, for vector backfill.
    async fn all_content(&self) -> Result<Vec<ContentRecord>, RepoError>;
}

/// One full-text match as returned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct FullTextHit {
    pub record: ContentRecord,
    /// Backend relevance. Lower is more relevant.
    pub rank: f64,
    pub snippet: Option<String>,
}

/// Full-text index over published content.
#[async_trait]
pub trait FullTextBackend: Send + Sync {
    /// Run a backend match expression, returning at most `limit` live hits
    /// in backend order.
    async fn match_published(
        &self,
        expression: &str,
        limit: u32,
    ) -> Result<Vec<FullTextHit>, RepoError>;
}
