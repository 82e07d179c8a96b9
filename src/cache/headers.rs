//! `Cache-Control` construction and presets.

use axum::{
    http::{HeaderValue, header},
    response::Response,
};

/// Inputs for a `Cache-Control` value. Unset durations are omitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub max_age: Option<u64>,
    pub s_max_age: Option<u64>,
    pub stale_while_revalidate: Option<u64>,
    pub stale_if_error: Option<u64>,
    pub private: bool,
    pub no_cache: bool,
    pub must_revalidate: bool,
}

impl CacheControl {
    /// Render the header value.
    ///
    /// `no_cache` wins over every other field. Otherwise directives come out as
    /// visibility, `max-age`, `s-maxage`, `stale-while-revalidate`,
    /// `stale-if-error`, `must-revalidate`.
    pub fn build(&self) -> String {
        if self.no_cache {
            return "no-cache, no-store, must-revalidate".to_string();
        }

        let mut directives = vec![if self.private { "private" } else { "public" }.to_string()];
        if let Some(seconds) = self.max_age {
            directives.push(format!("max-age={seconds}"));
        }
        if let Some(seconds) = self.s_max_age {
            directives.push(format!("s-maxage={seconds}"));
        }
        if let Some(seconds) = self.stale_while_revalidate {
            directives.push(format!("stale-while-revalidate={seconds}"));
        }
        if let Some(seconds) = self.stale_if_error {
            directives.push(format!("stale-if-error={seconds}"));
        }
        if self.must_revalidate {
            directives.push("must-revalidate".to_string());
        }
        directives.join(", ")
    }

    /// Blog pages and listings: 5 min browser, 10 min shared, 1 h stale.
    pub fn public_page() -> Self {
        Self {
            max_age: Some(300),
            s_max_age: Some(600),
            stale_while_revalidate: Some(3600),
            ..Self::default()
        }
    }

    /// Fingerprinted assets: 1 h browser, 1 day shared, 1 week stale.
    pub fn static_asset() -> Self {
        Self {
            max_age: Some(3600),
            s_max_age: Some(86_400),
            stale_while_revalidate: Some(604_800),
            ..Self::default()
        }
    }

    /// Read-only API responses: 1 min browser, 5 min shared, 30 min stale.
    pub fn api_read() -> Self {
        Self {
            max_age: Some(60),
            s_max_age: Some(300),
            stale_while_revalidate: Some(1800),
            ..Self::default()
        }
    }

    /// The lexical search index changes rarely: 5 min browser, 15 min shared.
    pub fn search_index() -> Self {
        Self {
            max_age: Some(300),
            s_max_age: Some(900),
            stale_while_revalidate: Some(1800),
            ..Self::default()
        }
    }

    pub fn no_cache() -> Self {
        Self {
            no_cache: true,
            ..Self::default()
        }
    }

    /// Per-user content: browser only.
    pub fn private() -> Self {
        Self {
            private: true,
            max_age: Some(300),
            must_revalidate: true,
            ..Self::default()
        }
    }
}

/// Set `Cache-Control` on `response` and default `Vary` to `Accept-Encoding`.
pub fn with_cache_headers(mut response: Response, cache_control: &CacheControl) -> Response {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&cache_control.build()) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if !headers.contains_key(header::VARY) {
        headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
    }
    response
}
