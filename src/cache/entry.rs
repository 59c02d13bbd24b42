//! Cache Entry Module
//!
//! An immutable stored value stamped with its insertion time.

use chrono::Utc;

// == Cache Entry ==
/// A single cached value. Entries are never edited in place; a write
/// replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    value: String,
    inserted_at: i64,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(value: impl Into<String>) -> Self {
        Self::at(value, now_secs())
    }

    /// Creates an entry stamped with `inserted_at` (Unix seconds).
    pub fn at(value: impl Into<String>, inserted_at: i64) -> Self {
        Self {
            value: value.into(),
            inserted_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Insertion time in Unix seconds.
    pub fn inserted_at(&self) -> i64 {
        self.inserted_at
    }

    /// Age in seconds as observed at `now`. Clock steps backwards read as 0.
    pub fn age_at(&self, now: i64) -> u64 {
        now.saturating_sub(self.inserted_at).max(0) as u64
    }

    // == Is Expired ==
    /// Checks the entry against `ttl` at time `now`.
    ///
    /// Expiry is strict: an entry exactly `ttl` seconds old is still live.
    /// `None` means the entry never expires.
    pub fn is_expired_at(&self, ttl: Option<u64>, now: i64) -> bool {
        match ttl {
            Some(ttl) => self.age_at(now) > ttl,
            None => false,
        }
    }
}

/// Current Unix timestamp in seconds.
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}
