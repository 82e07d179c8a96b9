//! Key/value store seam behind the tag-versioned cache.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::error::CacheUnavailable;

/// String-in, string-out store with optional per-entry expiry.
///
/// `ttl = None` means the entry lives until it is overwritten or deleted;
/// tag version counters are written that way.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheUnavailable>;

    async fn put(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), CacheUnavailable>;

    async fn delete(&self, key: &str) -> Result<(), CacheUnavailable>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local store. Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physical entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a physical key is still held, regardless of expiry.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheUnavailable> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), CacheUnavailable> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheUnavailable> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_returns_value() {
        let store = MemoryKvStore::new();
        store.put("a", "1".into(), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent_and_are_dropped() {
        let store = MemoryKvStore::new();
        store
            .put("a", "1".into(), Some(Duration::ZERO))
            .await
            .unwrap();
        assert!(store.contains_key("a"));
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(!store.contains_key("a"));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let store = MemoryKvStore::new();
        store.put("a", "1".into(), None).await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.is_empty());
        store.delete("missing").await.unwrap();
    }
}
