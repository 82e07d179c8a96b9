//! Edge cache middleware.
//!
//! Serves anonymous GET traffic on public routes from the edge cache and
//! stores successful responses on the way out.

use std::time::Duration;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use tracing::instrument;

use super::edge::{EdgeResponseCache, with_edge_cache_headers};

/// Shared state for [`edge_cache_layer`].
#[derive(Clone)]
pub struct EdgeCacheState {
    pub enabled: bool,
    pub ttl: Duration,
    pub cache: EdgeResponseCache,
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn edge_cache_layer(
    State(state): State<EdgeCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.enabled || !EdgeResponseCache::can_edge_cache(&request) {
        return next.run(request).await;
    }

    let Some(key) = EdgeResponseCache::build_key(&request) else {
        return next.run(request).await;
    };

    if let Some(cached) = state.cache.get(&key).await {
        return with_edge_cache_headers(cached, true);
    }

    let response = next.run(request).await;
    let response = state.cache.put(key, response, state.ttl).await;
    with_edge_cache_headers(response, false)
}
