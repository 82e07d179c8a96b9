//! Content-events hook.
//!
//! The write side posts here after committing a change, so the cache
//! orchestrator runs inside the process that owns the edge cache. Guarded by
//! the `server.internal_token` bearer token.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::error::HttpError;
use crate::application::repos::ContentStore;
use crate::cache::{CacheOrchestrator, ContentChange};

use super::public::HttpState;
use super::repo_error_to_http;

const SOURCE: &str = "infra::http::internal";

#[derive(Clone)]
pub struct ContentEventsHook {
    pub orchestrator: Arc<CacheOrchestrator>,
    pub token: Arc<str>,
}

impl ContentEventsHook {
    pub fn new(orchestrator: CacheOrchestrator, token: impl Into<Arc<str>>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            token: token.into(),
        }
    }

    fn accepts(&self, presented: &str) -> bool {
        presented.as_bytes().ct_eq(self.token.as_bytes()).into()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ContentEvent {
    change: ContentChange,
    id: Uuid,
    /// Slug before a rename.
    #[serde(default)]
    previous_slug: Option<String>,
    /// Last slug of a deleted record; the store no longer has it.
    #[serde(default)]
    slug: Option<String>,
}

pub(super) async fn require_internal_token(
    State(hook): State<ContentEventsHook>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorized = extract_token(request.headers().get(header::AUTHORIZATION))
        .is_some_and(|token| hook.accepts(token));
    if !authorized {
        warn!(
            target = "edgepress::internal",
            path = %request.uri().path(),
            "rejected content event without a valid token"
        );
        let mut response = HttpError::new(
            SOURCE,
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            "missing or invalid bearer token",
        )
        .into_response();
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        return response;
    }

    next.run(request).await
}

fn extract_token(header: Option<&HeaderValue>) -> Option<&str> {
    header?.to_str().ok()?.strip_prefix("Bearer ")
}

pub(super) async fn content_event(
    State(state): State<HttpState>,
    Json(event): Json<ContentEvent>,
) -> Response {
    let Some(hook) = state.content_events.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let orchestrator = hook.orchestrator.as_ref();

    let report = match event.change {
        ContentChange::Deleted => {
            let Some(slug) = event.slug.as_deref().filter(|slug| !slug.is_empty()) else {
                return HttpError::new(
                    SOURCE,
                    StatusCode::BAD_REQUEST,
                    "A deleted event needs the record's slug",
                    format!("deleted event for `{}` carried no slug", event.id),
                )
                .into_response();
            };
            orchestrator.content_removed(event.id, slug).await
        }
        ContentChange::Published | ContentChange::Updated => {
            let record = match state.db.content_by_id(event.id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    return HttpError::new(
                        SOURCE,
                        StatusCode::NOT_FOUND,
                        "Content not found",
                        format!("no content with id `{}`", event.id),
                    )
                    .into_response();
                }
                Err(err) => return repo_error_to_http(SOURCE, err).into_response(),
            };
            if event.change == ContentChange::Published {
                orchestrator.content_published(&record).await
            } else {
                orchestrator
                    .content_updated(&record, event.previous_slug.as_deref())
                    .await
            }
        }
    };

    info!(
        target = "edgepress::internal",
        change = %report.change,
        id = %event.id,
        "content event applied"
    );
    Json(report).into_response()
}
