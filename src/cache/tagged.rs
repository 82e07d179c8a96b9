//! Tag-versioned key/value cache.
//!
//! A tag owns a version counter stored at `cache:version:{tag}`. Tagged entries
//! are written under `key:v{version}`, so bumping the counter orphans the whole
//! family at once. Orphans are never deleted; their own TTL reclaims them.
//!
//! The cache is advisory. Store failures, timeouts and undecodable payloads are
//! logged and degrade to a miss on read and to a no-op on write.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::error::CacheUnavailable;
use super::keys::{version_key, versioned_key};
use super::kv::KvStore;

const METRIC_KV_HIT: &str = "edgepress_kv_cache_hit_total";
const METRIC_KV_MISS: &str = "edgepress_kv_cache_miss_total";
const METRIC_KV_ERROR: &str = "edgepress_kv_cache_error_total";
const METRIC_TAG_INVALIDATIONS: &str = "edgepress_tag_invalidations_total";

const INITIAL_VERSION: &str = "0";

#[derive(Clone)]
pub struct TagVersionedCache {
    store: Arc<dyn KvStore>,
    timeout: Duration,
    enabled: bool,
}

impl TagVersionedCache {
    pub fn new(store: Arc<dyn KvStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            timeout: config.store_timeout(),
            enabled: config.enable_kv_cache,
        }
    }

    /// Read `key`, scoped to the current version of `tag` when one is given.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, tag: Option<&str>) -> Option<T> {
        if !self.enabled {
            return None;
        }

        match self.try_get(key, tag).await {
            Ok(Some(value)) => {
                counter!(METRIC_KV_HIT).increment(1);
                debug!(cache = "kv", outcome = "hit", key, tag, "cache hit");
                Some(value)
            }
            Ok(None) => {
                counter!(METRIC_KV_MISS).increment(1);
                debug!(cache = "kv", outcome = "miss", key, tag, "cache miss");
                None
            }
            Err(err) => {
                counter!(METRIC_KV_ERROR, "op" => "get").increment(1);
                warn!(cache = "kv", key, tag, error = %err, "cache read degraded to miss");
                None
            }
        }
    }

    /// Write `value` under `key` for `ttl`, scoped to the current version of `tag`.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration, tag: Option<&str>) {
        if !self.enabled {
            return;
        }

        if let Err(err) = self.try_set(key, value, ttl, tag).await {
            counter!(METRIC_KV_ERROR, "op" => "set").increment(1);
            warn!(cache = "kv", key, tag, error = %err, "cache write skipped");
        }
    }

    /// Bump the version of `tag`, making every entry written under the old
    /// version unreachable.
    ///
    /// Read and increment are two separate store calls. Two concurrent
    /// invalidations may both read `n` and both write `n + 1`; the next
    /// invalidation recovers the lost bump and entry TTLs bound staleness.
    pub async fn invalidate(&self, tag: &str) {
        match self.try_invalidate(tag).await {
            Ok(version) => {
                counter!(METRIC_TAG_INVALIDATIONS, "tag" => tag.to_string()).increment(1);
                debug!(cache = "kv", tag, version, "tag invalidated");
            }
            Err(err) => {
                counter!(METRIC_KV_ERROR, "op" => "invalidate").increment(1);
                warn!(cache = "kv", tag, error = %err, "tag invalidation skipped");
            }
        }
    }

    /// Delete one untagged key.
    pub async fn remove(&self, key: &str) {
        let result = self
            .bounded("delete", key, self.store.delete(key))
            .await;
        if let Err(err) = result {
            counter!(METRIC_KV_ERROR, "op" => "delete").increment(1);
            warn!(cache = "kv", key, error = %err, "cache delete skipped");
        }
    }

    /// Serve from cache, or run `load`, store its value and return it.
    ///
    /// Loader errors are returned untouched and nothing is cached for them.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        key: &str,
        tag: Option<&str>,
        ttl: Duration,
        load: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(key, tag).await {
            return Ok(cached);
        }
        let value = load().await?;
        self.set(key, &value, ttl, tag).await;
        Ok(value)
    }

    /// Current version string for `tag`, `"0"` when no counter exists yet.
    pub async fn current_version(&self, tag: &str) -> Result<String, CacheUnavailable> {
        let key = version_key(tag);
        let stored = self.bounded("get", &key, self.store.get(&key)).await?;
        Ok(stored.unwrap_or_else(|| INITIAL_VERSION.to_string()))
    }

    async fn physical_key(&self, key: &str, tag: Option<&str>) -> Result<String, CacheUnavailable> {
        match tag {
            Some(tag) => {
                let version = self.current_version(tag).await?;
                Ok(versioned_key(key, &version))
            }
            None => Ok(key.to_string()),
        }
    }

    async fn try_get<T: DeserializeOwned>(
        &self,
        key: &str,
        tag: Option<&str>,
    ) -> Result<Option<T>, CacheUnavailable> {
        let physical = self.physical_key(key, tag).await?;
        let Some(raw) = self
            .bounded("get", &physical, self.store.get(&physical))
            .await?
        else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| CacheUnavailable::payload(physical, err))
    }

    async fn try_set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        tag: Option<&str>,
    ) -> Result<(), CacheUnavailable> {
        let physical = self.physical_key(key, tag).await?;
        let payload =
            serde_json::to_string(value).map_err(|err| CacheUnavailable::payload(&physical, err))?;
        self.bounded("put", &physical, self.store.put(&physical, payload, Some(ttl)))
            .await
    }

    async fn try_invalidate(&self, tag: &str) -> Result<u64, CacheUnavailable> {
        let key = version_key(tag);
        let current = self
            .bounded("get", &key, self.store.get(&key))
            .await?
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let next = current.saturating_add(1);
        self.bounded("put", &key, self.store.put(&key, next.to_string(), None))
            .await?;
        Ok(next)
    }

    async fn bounded<T, Fut>(
        &self,
        op: &'static str,
        key: &str,
        call: Fut,
    ) -> Result<T, CacheUnavailable>
    where
        Fut: Future<Output = Result<T, CacheUnavailable>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheUnavailable::timeout(op, key)),
        }
    }
}
