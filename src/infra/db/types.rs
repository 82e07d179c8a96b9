use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use uuid::Uuid;

use crate::application::repos::{FullTextHit, RepoError};
use crate::domain::entities::ContentRecord;
use crate::domain::error::DomainError;
use crate::domain::types::ContentStatus;

/// Separator used by `GROUP_CONCAT` when flattening tag names.
pub(crate) const TAG_SEPARATOR: char = '|';

const STORED_TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

pub(crate) fn format_timestamp(value: OffsetDateTime) -> Result<String, DomainError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(STORED_TIMESTAMP)
        .map_err(|_| DomainError::timestamp(value.to_string()))
}

/// Accepts the stored layout and falls back to any RFC 3339 value, so rows
/// written by external tooling still load.
pub(crate) fn parse_timestamp(value: &str) -> Result<OffsetDateTime, DomainError> {
    PrimitiveDateTime::parse(value, STORED_TIMESTAMP)
        .map(PrimitiveDateTime::assume_utc)
        .or_else(|_| OffsetDateTime::parse(value, &Rfc3339))
        .map_err(|_| DomainError::timestamp(value))
}

#[derive(sqlx::FromRow)]
pub(crate) struct ContentRow {
    pub(crate) id: String,
    pub(crate) slug: String,
    pub(crate) title: String,
    pub(crate) excerpt: Option<String>,
    pub(crate) body: String,
    pub(crate) status: String,
    pub(crate) published_at: Option<String>,
    pub(crate) reading_time: Option<i64>,
    pub(crate) category_id: Option<String>,
    pub(crate) tags: Option<String>,
}

impl TryFrom<ContentRow> for ContentRecord {
    type Error = RepoError;

    fn try_from(row: ContentRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|err| RepoError::integrity(format!("content id `{}`: {err}", row.id)))?;
        let status: ContentStatus = row
            .status
            .parse()
            .map_err(|err: DomainError| RepoError::integrity(err.to_string()))?;
        let published_at = row
            .published_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(|err| RepoError::integrity(err.to_string()))?;
        let reading_time = row
            .reading_time
            .map(u32::try_from)
            .transpose()
            .map_err(|_| RepoError::integrity(format!("reading_time out of range for `{}`", row.slug)))?;

        Ok(Self {
            id,
            slug: row.slug,
            title: row.title,
            excerpt: row.excerpt,
            body: row.body,
            status,
            published_at,
            reading_time,
            category_id: row.category_id,
            tags: split_tags(row.tags.as_deref()),
        })
    }
}

fn split_tags(value: Option<&str>) -> Vec<String> {
    value
        .map(|joined| {
            joined
                .split(TAG_SEPARATOR)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(sqlx::FromRow)]
pub(crate) struct FullTextRow {
    #[sqlx(flatten)]
    pub(crate) content: ContentRow,
    pub(crate) score: f64,
    pub(crate) snippet: Option<String>,
}

impl TryFrom<FullTextRow> for FullTextHit {
    type Error = RepoError;

    fn try_from(row: FullTextRow) -> Result<Self, Self::Error> {
        Ok(Self {
            record: ContentRecord::try_from(row.content)?,
            rank: row.score,
            snippet: row.snippet.filter(|snippet| !snippet.is_empty()),
        })
    }
}
