//! Cache Statistics Module
//!
//! Counters describing how lookups against the cache went. Read by the
//! server handle and logged when the server stops.

use std::fmt;

use serde::Serialize;

// == Cache Stats ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered from a live entry
    pub hits: u64,
    /// Reads that found nothing usable (absent or expired)
    pub misses: u64,
    /// Entries dropped because a read found them past their TTL
    pub expirations: u64,
    /// Writes, including overwrites of an existing key
    pub writes: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if nothing was read yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// An expired read is also a miss.
    pub(crate) fn record_expiration(&mut self) {
        self.expirations += 1;
        self.misses += 1;
    }

    pub(crate) fn record_write(&mut self) {
        self.writes += 1;
    }

    pub(crate) fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entries={} hits={} misses={} expirations={} writes={} hit_rate={:.2}",
            self.total_entries,
            self.hits,
            self.misses,
            self.expirations,
            self.writes,
            self.hit_rate()
        )
    }
}
