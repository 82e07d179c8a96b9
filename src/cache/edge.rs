//! Edge response cache.
//!
//! Holds whole HTTP responses for anonymous GET traffic, keyed by the
//! origin-relative request target. Independent of the tag-versioned KV cache:
//! entries are purged one URL at a time or expire by their own `max-age`.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    body::{Body, HttpBody},
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tracing::{debug, warn};
use url::Url;

use super::config::CacheConfig;
use super::error::CacheUnavailable;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::edge";

const METRIC_EDGE_HIT: &str = "edgepress_edge_cache_hit_total";
const METRIC_EDGE_MISS: &str = "edgepress_edge_cache_miss_total";
const METRIC_EDGE_STORE: &str = "edgepress_edge_cache_store_total";

/// Diagnostic response header carrying `hit` or `miss`.
pub const EDGE_CACHE_HEADER: &str = "x-edge-cache";

const EXCLUDED_PREFIXES: [&str; 2] = ["/admin", "/api"];

/// Origin-relative request target, e.g. `/post/hello?ref=feed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeCacheKey(String);

impl EdgeCacheKey {
    pub fn from_uri(uri: &Uri) -> Self {
        let target = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());
        Self(target.to_string())
    }

    /// Accepts an absolute URL or an origin-relative path.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with('/') {
            return url.parse::<Uri>().ok().map(|uri| Self::from_uri(&uri));
        }
        let parsed = Url::parse(url).ok()?;
        let mut target = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            target.push('?');
            target.push_str(query);
        }
        Some(Self(target))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn path(&self) -> &str {
        self.0.split_once('?').map_or(&self.0, |(path, _)| path)
    }
}

/// A buffered response plus its expiry.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    expires_at: Instant,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes, ttl: Duration) -> Self {
        Self {
            status,
            headers,
            body,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Storage seam for the edge cache.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn lookup(&self, key: &EdgeCacheKey) -> Result<Option<CachedResponse>, CacheUnavailable>;

    async fn put(&self, key: EdgeCacheKey, response: CachedResponse)
    -> Result<(), CacheUnavailable>;

    /// Returns whether an entry was removed.
    async fn delete(&self, key: &EdgeCacheKey) -> Result<bool, CacheUnavailable>;
}

/// Bounded LRU held in process memory.
pub struct MemoryResponseStore {
    entries: Mutex<LruCache<EdgeCacheKey, CachedResponse>>,
}

impl MemoryResponseStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResponseStore for MemoryResponseStore {
    async fn lookup(&self, key: &EdgeCacheKey) -> Result<Option<CachedResponse>, CacheUnavailable> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "lookup");
        let fresh = match entries.get(key) {
            Some(cached) if cached.is_fresh(Instant::now()) => Some(cached.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if fresh.is_none() {
            entries.pop(key);
        }
        Ok(fresh)
    }

    async fn put(
        &self,
        key: EdgeCacheKey,
        response: CachedResponse,
    ) -> Result<(), CacheUnavailable> {
        mutex_lock(&self.entries, SOURCE, "put").put(key, response);
        Ok(())
    }

    async fn delete(&self, key: &EdgeCacheKey) -> Result<bool, CacheUnavailable> {
        Ok(mutex_lock(&self.entries, SOURCE, "delete")
            .pop(key)
            .is_some())
    }
}

#[derive(Clone)]
pub struct EdgeResponseCache {
    store: Arc<dyn ResponseStore>,
    body_limit: usize,
}

impl EdgeResponseCache {
    pub fn new(store: Arc<dyn ResponseStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            body_limit: config.edge_body_limit_bytes,
        }
    }

    /// Key for anonymous GET requests; `None` for anything else.
    pub fn build_key<B>(request: &Request<B>) -> Option<EdgeCacheKey> {
        if request.method() != Method::GET {
            return None;
        }
        if request.headers().contains_key(header::COOKIE) {
            return None;
        }
        Some(EdgeCacheKey::from_uri(request.uri()))
    }

    /// [`Self::build_key`] plus the admin and API path exclusions.
    pub fn can_edge_cache<B>(request: &Request<B>) -> bool {
        let path = request.uri().path();
        Self::build_key(request).is_some()
            && !EXCLUDED_PREFIXES
                .iter()
                .any(|prefix| path.starts_with(prefix))
    }

    pub async fn get(&self, key: &EdgeCacheKey) -> Option<Response> {
        match self.store.lookup(key).await {
            Ok(Some(cached)) => {
                counter!(METRIC_EDGE_HIT).increment(1);
                debug!(cache = "edge", outcome = "hit", key = key.as_str(), "serving cached response");
                Some(cached.into_response())
            }
            Ok(None) => {
                counter!(METRIC_EDGE_MISS).increment(1);
                debug!(cache = "edge", outcome = "miss", key = key.as_str(), "edge cache miss");
                None
            }
            Err(err) => {
                counter!(METRIC_EDGE_MISS).increment(1);
                warn!(cache = "edge", key = key.as_str(), error = %err, "edge lookup degraded to miss");
                None
            }
        }
    }

    /// Store a copy of `response` for `ttl` and hand the response back.
    ///
    /// Only success responses without `Set-Cookie` are stored. The stored copy
    /// is stamped `Cache-Control: public, max-age={ttl}`; the returned response
    /// keeps its own headers.
    pub async fn put(&self, key: EdgeCacheKey, response: Response, ttl: Duration) -> Response {
        if !should_store_response(&response) || !self.fits_body_limit(&response) {
            return response;
        }

        let (parts, body) = response.into_parts();
        let bytes = match axum::body::to_bytes(body, self.body_limit).await {
            Ok(bytes) => bytes,
            Err(err) => {
                // The body itself failed mid-read; there is nothing left to forward.
                warn!(cache = "edge", key = key.as_str(), error = %err, "failed to buffer response body");
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };

        let mut headers = parts.headers.clone();
        if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", ttl.as_secs())) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        let cached = CachedResponse::new(parts.status, headers, bytes.clone(), ttl);

        match self.store.put(key.clone(), cached).await {
            Ok(()) => {
                counter!(METRIC_EDGE_STORE).increment(1);
                debug!(cache = "edge", key = key.as_str(), ttl_seconds = ttl.as_secs(), "response stored");
            }
            Err(err) => {
                warn!(cache = "edge", key = key.as_str(), error = %err, "edge store skipped");
            }
        }

        Response::from_parts(parts, Body::from(bytes))
    }

    /// Purge one canonical URL. Returns whether an entry was removed.
    pub async fn delete(&self, url: &str) -> bool {
        let Some(key) = EdgeCacheKey::from_url(url) else {
            warn!(cache = "edge", url, "edge purge skipped for unparseable url");
            return false;
        };
        match self.store.delete(&key).await {
            Ok(removed) => {
                debug!(cache = "edge", key = key.as_str(), removed, "edge entry purged");
                removed
            }
            Err(err) => {
                warn!(cache = "edge", key = key.as_str(), error = %err, "edge purge skipped");
                false
            }
        }
    }

    /// Only bodies of known size within the limit are buffered; streaming and
    /// oversized bodies pass through untouched.
    fn fits_body_limit(&self, response: &Response) -> bool {
        response
            .body()
            .size_hint()
            .exact()
            .is_some_and(|length| length <= self.body_limit as u64)
    }
}

/// Tag `response` with the `x-edge-cache` diagnostic header.
pub fn with_edge_cache_headers(mut response: Response, hit: bool) -> Response {
    let value = if hit { "hit" } else { "miss" };
    response
        .headers_mut()
        .insert(EDGE_CACHE_HEADER, HeaderValue::from_static(value));
    response
}

fn should_store_response(response: &Response) -> bool {
    if !response.status().is_success() {
        return false;
    }

    if response.headers().contains_key(header::SET_COOKIE) {
        return false;
    }

    !response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn cache_with_store() -> (EdgeResponseCache, Arc<MemoryResponseStore>) {
        let store = Arc::new(MemoryResponseStore::new(NonZeroUsize::new(8).unwrap()));
        let cache = EdgeResponseCache::new(store.clone(), &CacheConfig::default());
        (cache, store)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn build_key_rejects_post_and_cookie_requests() {
        assert!(EdgeResponseCache::build_key(&request(Method::POST, "/post/a")).is_none());

        let mut with_cookie = request(Method::GET, "/post/a");
        with_cookie
            .headers_mut()
            .insert(header::COOKIE, HeaderValue::from_static("session=1"));
        assert!(EdgeResponseCache::build_key(&with_cookie).is_none());

        let key = EdgeResponseCache::build_key(&request(Method::GET, "/post/a?x=1")).unwrap();
        assert_eq!(key.as_str(), "/post/a?x=1");
        assert_eq!(key.path(), "/post/a");
    }

    #[test]
    fn admin_and_api_paths_are_not_edge_cacheable() {
        assert!(EdgeResponseCache::can_edge_cache(&request(Method::GET, "/post/a")));
        assert!(!EdgeResponseCache::can_edge_cache(&request(Method::GET, "/admin/posts")));
        assert!(!EdgeResponseCache::can_edge_cache(&request(Method::GET, "/api/search?q=x")));
        assert!(!EdgeResponseCache::can_edge_cache(&request(Method::HEAD, "/post/a")));
    }

    #[test]
    fn key_from_absolute_url_drops_origin() {
        let key = EdgeCacheKey::from_url("https://blog.example.com/post/hello?ref=1").unwrap();
        assert_eq!(key.as_str(), "/post/hello?ref=1");
        assert_eq!(EdgeCacheKey::from_url("/post/hello").unwrap().as_str(), "/post/hello");
        assert!(EdgeCacheKey::from_url("not a url").is_none());
    }

    #[tokio::test]
    async fn put_stores_copy_with_public_max_age() {
        let (cache, _) = cache_with_store();
        let key = EdgeCacheKey::from_url("/post/a").unwrap();
        let returned = cache
            .put(key.clone(), (StatusCode::OK, "hello").into_response(), Duration::from_secs(120))
            .await;
        assert!(returned.headers().get(header::CACHE_CONTROL).is_none());
        assert_eq!(body_text(returned).await, "hello");

        let cached = cache.get(&key).await.unwrap();
        assert_eq!(cached.headers()[header::CACHE_CONTROL], "public, max-age=120");
        assert_eq!(body_text(cached).await, "hello");
    }

    #[tokio::test]
    async fn put_skips_errors_and_set_cookie() {
        let (cache, store) = cache_with_store();
        let key = EdgeCacheKey::from_url("/post/a").unwrap();

        let failed = (StatusCode::NOT_FOUND, "missing").into_response();
        let failed = cache.put(key.clone(), failed, Duration::from_secs(60)).await;
        assert_eq!(failed.status(), StatusCode::NOT_FOUND);

        let mut with_cookie = (StatusCode::OK, "hi").into_response();
        with_cookie
            .headers_mut()
            .insert(header::SET_COOKIE, HeaderValue::from_static("session=1"));
        cache.put(key.clone(), with_cookie, Duration::from_secs(60)).await;

        assert!(store.is_empty());
    }

    fn small_body_cache() -> (EdgeResponseCache, Arc<MemoryResponseStore>) {
        let store = Arc::new(MemoryResponseStore::new(NonZeroUsize::new(8).unwrap()));
        let config = CacheConfig {
            edge_body_limit_bytes: 16,
            ..CacheConfig::default()
        };
        (EdgeResponseCache::new(store.clone(), &config), store)
    }

    #[tokio::test]
    async fn oversized_body_is_passed_through() {
        let (cache, store) = small_body_cache();
        let key = EdgeCacheKey::from_url("/big").unwrap();
        let response = cache
            .put(
                key,
                (StatusCode::OK, "far too large for the limit").into_response(),
                Duration::from_secs(60),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "far too large for the limit");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn oversized_json_without_content_length_is_passed_through() {
        let (cache, store) = small_body_cache();
        let key = EdgeCacheKey::from_url("/").unwrap();
        let response = axum::Json(serde_json::json!({ "posts": "x".repeat(64) })).into_response();
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

        let response = cache.put(key, response, Duration::from_secs(60)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["posts"].as_str().map(str::len), Some(64));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn body_at_the_limit_is_stored() {
        let (cache, store) = small_body_cache();
        let key = EdgeCacheKey::from_url("/fits").unwrap();
        let response = cache
            .put(key, (StatusCode::OK, "sixteen bytes!!!").into_response(), Duration::from_secs(60))
            .await;
        assert_eq!(body_text(response).await, "sixteen bytes!!!");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let (cache, store) = cache_with_store();
        let key = EdgeCacheKey::from_url("/post/a").unwrap();
        cache
            .put(key.clone(), (StatusCode::OK, "x").into_response(), Duration::ZERO)
            .await;
        assert!(cache.get(&key).await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_purges_single_url() {
        let (cache, store) = cache_with_store();
        for path in ["/post/a", "/post/b"] {
            let key = EdgeCacheKey::from_url(path).unwrap();
            cache
                .put(key, (StatusCode::OK, "x").into_response(), Duration::from_secs(60))
                .await;
        }
        assert!(cache.delete("https://blog.example.com/post/a").await);
        assert!(!cache.delete("/post/a").await);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn diagnostic_header() {
        let response = with_edge_cache_headers(Response::new(Body::empty()), true);
        assert_eq!(response.headers()[EDGE_CACHE_HEADER], "hit");
        let response = with_edge_cache_headers(Response::new(Body::empty()), false);
        assert_eq!(response.headers()[EDGE_CACHE_HEADER], "miss");
    }
}
