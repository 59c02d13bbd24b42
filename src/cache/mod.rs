//! Cache Module
//!
//! Provides the in-memory key/value cache with optional TTL expiry on read.

mod entry;
mod stats;
mod store;


// Re-export public types
pub use entry::{now_secs, CacheEntry};
pub use stats::CacheStats;
pub use store::{CacheStore, SharedCache};
