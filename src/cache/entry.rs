//! Cache Entry Module
//!
//! Defines the per-version record stored under a cache key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Versioned Entry ==
/// One version's slot inside a stored cache key.
///
/// Serialized as `{ "data": .., "expireTime": ms, "time": ms }`; a storage key
/// holds a JSON object mapping version strings to these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedEntry {
    /// The cached payload
    pub data: Value,
    /// Lifetime in milliseconds the entry was written with, 0 = never expires
    #[serde(rename = "expireTime")]
    pub expire_time_ms: u64,
    /// Write timestamp (Unix milliseconds)
    #[serde(rename = "time")]
    pub stored_at_ms: u64,
}

impl VersionedEntry {
    // == Constructor ==
    pub fn new(data: Value, expire_time_ms: u64, now_ms: u64) -> Self {
        Self {
            data,
            expire_time_ms,
            stored_at_ms: now_ms,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now_ms`.
    ///
    /// Boundary condition: an entry stays valid while
    /// `stored_at + expire_time >= now`, so it expires only once `now` is
    /// strictly past that instant. Entries with `expire_time == 0` never expire.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expire_time_ms > 0 && self.stored_at_ms.saturating_add(self.expire_time_ms) < now_ms
    }

    // == Time To Live ==
    /// Returns remaining lifetime in milliseconds, or None if it never expires.
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        if self.expire_time_ms == 0 {
            return None;
        }
        let expires = self.stored_at_ms.saturating_add(self.expire_time_ms);
        Some(expires.saturating_sub(now_ms))
    }
}
