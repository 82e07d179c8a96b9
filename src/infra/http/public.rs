use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::{
    application::{
        content::CachedContentReader, error::HttpError, search::SearchService,
    },
    cache::{CacheControl, EdgeCacheState, edge_cache_layer, with_cache_headers},
    domain::entities::ContentRecord,
    infra::db::SqliteRepositories,
};

use super::{
    db_health_response,
    internal::{self, ContentEventsHook},
    middleware::{log_responses, set_request_context},
    repo_error_to_http, search,
};

#[derive(Clone)]
pub struct HttpState {
    pub content: Arc<CachedContentReader>,
    pub search: Arc<SearchService>,
    pub db: Arc<SqliteRepositories>,
    pub edge: Option<EdgeCacheState>,
    /// Page size of the `/` listing; one of the cached listing sizes.
    pub listing_page_size: u32,
    /// Mounted at `/_internal/content-events` when present.
    pub content_events: Option<ContentEventsHook>,
}

pub fn build_router(state: HttpState) -> Router {
    // Anonymous public reads; the edge layer decides per request whether to cache.
    let cached_routes = Router::new()
        .route("/", get(index))
        .route("/post/{slug}", get(post_detail));

    let cached_routes = if let Some(edge_state) = state.edge.clone() {
        cached_routes.layer(middleware::from_fn_with_state(edge_state, edge_cache_layer))
    } else {
        cached_routes
    };

    let mut uncached_routes = Router::new()
        .route("/api/search", get(search::search))
        .route("/api/search/index", get(search::search_index))
        .route("/api/search/semantic", get(search::semantic_search))
        .route("/api/search/all", get(search::search_all))
        .route("/_health/db", get(public_health));

    if let Some(hook) = state.content_events.clone() {
        let internal_routes = Router::new()
            .route("/_internal/content-events", post(internal::content_event))
            .route_layer(middleware::from_fn_with_state(
                hook,
                internal::require_internal_token,
            ));
        uncached_routes = uncached_routes.merge(internal_routes);
    }

    cached_routes
        .merge(uncached_routes)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Serialize)]
struct ListingBody {
    posts: Vec<ContentRecord>,
}

async fn index(State(state): State<HttpState>) -> Response {
    match state
        .content
        .published_content(state.listing_page_size, 0)
        .await
    {
        Ok(posts) => with_cache_headers(
            Json(ListingBody { posts }).into_response(),
            &CacheControl::public_page(),
        ),
        Err(err) => repo_error_to_http("infra::http::public::index", err).into_response(),
    }
}

async fn post_detail(State(state): State<HttpState>, Path(slug): Path<String>) -> Response {
    match state.content.content_by_slug(&slug).await {
        Ok(Some(record)) => with_cache_headers(
            Json(record).into_response(),
            &CacheControl::public_page(),
        ),
        Ok(None) => HttpError::new(
            "infra::http::public::post_detail",
            StatusCode::NOT_FOUND,
            "Post not found",
            format!("no live post with slug `{slug}`"),
        )
        .into_response(),
        Err(err) => repo_error_to_http("infra::http::public::post_detail", err).into_response(),
    }
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}
