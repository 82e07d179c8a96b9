//! Search API handlers.
//!
//! Failures answer with an empty result list plus an `error` code so clients
//! can render "no results" without special-casing transport errors.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    application::{
        error::ErrorReport,
        search::{DEFAULT_FULLTEXT_LIMIT, DEFAULT_SEMANTIC_LIMIT, MAX_SEARCH_RESULTS},
    },
    cache::{CacheControl, with_cache_headers},
    domain::search::SearchIndexItem,
};

use super::public::HttpState;

const MIN_QUERY_CHARS: usize = 2;
const MAX_API_LIMIT: u32 = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct SearchParams {
    q: Option<String>,
    // Kept as text so a malformed value falls back to the default instead of a 400.
    limit: Option<String>,
}

impl SearchParams {
    /// Trimmed query, or `None` when it is too short to search.
    fn query(&self) -> Option<&str> {
        let query = self.q.as_deref().unwrap_or("").trim();
        (query.chars().count() >= MIN_QUERY_CHARS).then_some(query)
    }

    fn limit(&self, default: u32, max: u32) -> u32 {
        self.limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(|value| value.clamp(1, i64::from(max)) as u32)
            .unwrap_or(default)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultsBody<T> {
    results: Vec<T>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    too_short: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

impl<T: Serialize> ResultsBody<T> {
    fn ok(results: Vec<T>) -> Self {
        Self {
            results,
            too_short: false,
            error: None,
        }
    }

    fn too_short() -> Self {
        Self {
            results: Vec::new(),
            too_short: true,
            error: None,
        }
    }

    fn failed(code: &'static str) -> Self {
        Self {
            results: Vec::new(),
            too_short: false,
            error: Some(code),
        }
    }
}

#[derive(Debug, Serialize)]
struct IndexBody {
    items: Vec<SearchIndexItem>,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

fn failure_response<B: Serialize>(
    source: &'static str,
    status: StatusCode,
    body: B,
    err: &dyn std::error::Error,
) -> Response {
    let mut response = (status, Json(body)).into_response();
    ErrorReport::from_error(source, status, err).attach(&mut response);
    response
}

fn too_short_response() -> Response {
    with_cache_headers(
        Json(ResultsBody::<()>::too_short()).into_response(),
        &CacheControl::api_read(),
    )
}

/// `GET /api/search?q=&limit=`: cached full-text search.
pub(super) async fn search(
    State(state): State<HttpState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(query) = params.query() else {
        return too_short_response();
    };
    let limit = params.limit(DEFAULT_FULLTEXT_LIMIT, MAX_API_LIMIT);

    match state.search.fulltext().search_cached(query, limit).await {
        Ok(results) => with_cache_headers(
            Json(ResultsBody::ok(results)).into_response(),
            &CacheControl::api_read(),
        ),
        Err(err) => failure_response(
            "infra::http::search::search",
            StatusCode::INTERNAL_SERVER_ERROR,
            ResultsBody::<()>::failed("search_failed"),
            &err,
        ),
    }
}

/// `GET /api/search/index`: the lexical index for client-side scoring.
pub(super) async fn search_index(State(state): State<HttpState>) -> Response {
    match state
        .search
        .lexical()
        .build_cached(state.search.index_limit())
        .await
    {
        Ok(items) => {
            let count = items.len();
            with_cache_headers(
                Json(IndexBody {
                    items,
                    count,
                    error: None,
                })
                .into_response(),
                &CacheControl::search_index(),
            )
        }
        Err(err) => failure_response(
            "infra::http::search::search_index",
            StatusCode::INTERNAL_SERVER_ERROR,
            IndexBody {
                items: Vec::new(),
                count: 0,
                error: Some("search_index_failed"),
            },
            &err,
        ),
    }
}

/// `GET /api/search/semantic?q=&limit=`: published nearest neighbours.
pub(super) async fn semantic_search(
    State(state): State<HttpState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(query) = params.query() else {
        return too_short_response();
    };
    let Some(engine) = state.search.semantic() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ResultsBody::<()>::failed("semantic_disabled")),
        )
            .into_response();
    };
    let limit = params.limit(DEFAULT_SEMANTIC_LIMIT as u32, MAX_SEARCH_RESULTS as u32);

    match engine.search(query, limit as usize, false).await {
        Ok(matches) => with_cache_headers(
            Json(ResultsBody::ok(matches)).into_response(),
            &CacheControl::api_read(),
        ),
        Err(err) => failure_response(
            "infra::http::search::semantic_search",
            StatusCode::BAD_GATEWAY,
            ResultsBody::<()>::failed("semantic_failed"),
            &err,
        ),
    }
}

/// `GET /api/search/all?q=&limit=`: every engine, reported side by side.
pub(super) async fn search_all(
    State(state): State<HttpState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(query) = params.query() else {
        return too_short_response();
    };
    let limit = params.limit(DEFAULT_FULLTEXT_LIMIT, MAX_API_LIMIT);

    let results = state.search.search_all(query, limit as usize).await;
    with_cache_headers(Json(results).into_response(), &CacheControl::api_read())
}
