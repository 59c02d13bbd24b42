//! Cache Store Module
//!
//! HashMap storage with optional TTL expiry applied lazily on read.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::entry::now_secs;
use crate::cache::{CacheEntry, CacheStats};

/// Cache handle shared by the server and every connection handler.
///
/// Each get or put holds the lock for that one operation only; a
/// "check, fetch, store" sequence is deliberately not atomic.
pub type SharedCache = Arc<RwLock<CacheStore>>;

// == Cache Store ==
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage, at most one entry per key
    entries: HashMap<String, CacheEntry>,
    /// Maximum entry age in seconds, None = no expiry
    ttl: Option<u64>,
    stats: CacheStats,
}

impl CacheStore {
    /// Creates an empty store. `ttl` of None disables expiry.
    pub fn new(ttl: Option<u64>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            stats: CacheStats::new(),
        }
    }

    /// Wraps a new store for sharing across tasks.
    pub fn shared(ttl: Option<u64>) -> SharedCache {
        Arc::new(RwLock::new(Self::new(ttl)))
    }

    pub fn ttl(&self) -> Option<u64> {
        self.ttl
    }

    // == Get ==
    /// Returns the live value for `key`, evicting it first if its TTL ran out.
    pub fn get(&mut self, key: &str) -> Option<String> {
        self.get_at(key, now_secs())
    }

    /// Same as [`get`](Self::get) with an explicit clock reading.
    pub fn get_at(&mut self, key: &str, now: i64) -> Option<String> {
        let Some(entry) = self.entries.get(key) else {
            self.stats.record_miss();
            return None;
        };

        if entry.is_expired_at(self.ttl, now) {
            debug!(key, age = entry.age_at(now), "Evicting expired entry");
            self.entries.remove(key);
            self.stats.set_total_entries(self.entries.len());
            self.stats.record_expiration();
            return None;
        }

        let value = entry.value().to_string();
        self.stats.record_hit();
        Some(value)
    }

    // == Put ==
    /// Replaces any entry for `key` with a freshly stamped one.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.put_at(key, value, now_secs());
    }

    /// Same as [`put`](Self::put) with an explicit clock reading.
    pub fn put_at(&mut self, key: impl Into<String>, value: impl Into<String>, now: i64) {
        self.entries.insert(key.into(), CacheEntry::at(value, now));
        self.stats.record_write();
        self.stats.set_total_entries(self.entries.len());
    }

    /// Reports whether an entry is stored for `key`, expired or not.
    /// Does not evict and does not touch the statistics.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_new() {
        let store = CacheStore::new(Some(10));
        assert!(store.is_empty());
        assert_eq!(store.ttl(), Some(10));
    }

    #[test]
    fn test_store_put_and_get() {
        let mut store = CacheStore::new(Some(10));

        store.put("key1", "value1");

        assert_eq!(store.get("key1").as_deref(), Some("value1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_missing() {
        let mut store = CacheStore::new(None);
        assert!(store.get("missing").is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_store_overwrite_replaces_entry() {
        let mut store = CacheStore::new(Some(10));

        store.put_at("key1", "old", 100);
        store.put_at("key1", "new", 105);

        assert_eq!(store.len(), 1);
        // The overwrite restarts the TTL clock.
        assert_eq!(store.get_at("key1", 114).as_deref(), Some("new"));
    }

    #[test]
    fn test_store_ttl_within_window() {
        let mut store = CacheStore::new(Some(10));

        store.put_at("key1", "value1", 1_000);

        assert_eq!(store.get_at("key1", 1_009).as_deref(), Some("value1"));
        assert!(store.contains_key("key1"));
    }

    #[test]
    fn test_store_ttl_expired_read_evicts() {
        let mut store = CacheStore::new(Some(10));

        store.put_at("key1", "value1", 1_000);

        assert!(store.get_at("key1", 1_011).is_none());
        assert!(!store.contains_key("key1"));
        assert!(store.is_empty());

        let stats = store.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_store_without_ttl_keeps_old_entries() {
        let mut store = CacheStore::new(None);

        store.put_at("city", "summary", 0);

        assert_eq!(store.get_at("city", 1_000_000).as_deref(), Some("summary"));
    }

    #[test]
    fn test_store_stats() {
        let mut store = CacheStore::new(Some(10));

        store.put("key1", "value1");
        store.get("key1");
        store.get("nonexistent");

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test]
    async fn test_shared_store_concurrent_puts_keep_one_value() {
        let cache = CacheStore::shared(Some(10));
        let mut tasks = Vec::new();

        for i in 0..32 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                cache.write().await.put("k", format!("value_{i}"));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut guard = cache.write().await;
        assert_eq!(guard.len(), 1);
        let value = guard.get("k").unwrap();
        let index: usize = value.strip_prefix("value_").unwrap().parse().unwrap();
        assert!(index < 32);
    }
}
