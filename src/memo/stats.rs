//! Call Statistics Module
//!
//! Tracks how memoized calls were satisfied.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Call Stats ==
/// Snapshot of a wrapper's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallStats {
    /// Calls made through the wrapper
    pub calls: u64,
    /// Times the underlying function actually ran
    pub invocations: u64,
    /// Calls that joined an in-flight invocation
    pub coalesced: u64,
    /// Calls answered from a stored or retained result
    pub cache_hits: u64,
    /// Invocations that ended in an error
    pub failures: u64,
    /// Argument keys with an invocation currently running
    pub in_flight: usize,
}

impl CallStats {
    // == Hit Rate ==
    /// Share of calls that did not trigger an invocation.
    ///
    /// Returns 0.0 if no calls have been made.
    pub fn hit_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            (self.coalesced + self.cache_hits) as f64 / self.calls as f64
        }
    }
}

// == Stats Recorder ==
/// Lock-free counters shared by a wrapper and its spawned invocations.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    calls: AtomicU64,
    invocations: AtomicU64,
    coalesced: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
}

impl StatsRecorder {
    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, in_flight: usize) -> CallStats {
        CallStats {
            calls: self.calls.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            in_flight,
        }
    }
}
