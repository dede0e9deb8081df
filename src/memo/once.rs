//! Async Once Module
//!
//! Coalesces identical concurrent calls and keeps each settled outcome,
//! success or failure, for a short while in process.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::cache::Clock;
use crate::error::MemoError;
use crate::memo::flight::{call_key, wait, AbandonGuard, Flight, Joined};
use crate::memo::stats::{CallStats, StatsRecorder};
use crate::memo::wrapper::WrapperKind;

struct Retained<T, E> {
    outcome: Result<T, E>,
    until_ms: u64,
}

struct OnceInner<F, T, E> {
    func: F,
    flight: Flight<T, E>,
    clock: Arc<dyn Clock>,
    hold_ms: u64,
    settled: Mutex<HashMap<String, Retained<T, E>>>,
    stats: StatsRecorder,
}

impl<F, T: Clone, E: Clone> OnceInner<F, T, E> {
    /// Returns the retained outcome for `key` if it is still within its hold.
    fn retained(&self, key: &str) -> Option<Result<T, E>> {
        let mut settled = self.settled.lock();
        let now = self.clock.now_ms();
        match settled.get(key) {
            Some(entry) if now <= entry.until_ms => Some(entry.outcome.clone()),
            Some(_) => {
                settled.remove(key);
                None
            }
            None => None,
        }
    }

    /// Keeps `outcome` for the hold window. Lapsed entries for every key are
    /// dropped on the way.
    fn retain(&self, key: &str, outcome: &Result<T, E>) {
        if self.hold_ms == 0 {
            return;
        }
        let now = self.clock.now_ms();
        let until_ms = now.saturating_add(self.hold_ms);
        let mut settled = self.settled.lock();
        settled.retain(|_, entry| now <= entry.until_ms);
        settled.insert(
            key.to_string(),
            Retained {
                outcome: outcome.clone(),
                until_ms,
            },
        );
    }
}

// == Async Once ==
/// Async function wrapper that shares in-flight calls and replays the last
/// outcome for `hold_ms` after it settles.
///
/// Unlike [`crate::memo::Memoized`], failures are replayed too, and nothing
/// leaves the process. A hold of 0 retains nothing.
pub struct AsyncOnce<F, A, T, E> {
    inner: Arc<OnceInner<F, T, E>>,
    _args: PhantomData<fn(A)>,
}

impl<F, A, T, E> Clone for AsyncOnce<F, A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _args: PhantomData,
        }
    }
}

impl<F, A, T, E> fmt::Debug for AsyncOnce<F, A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncOnce")
            .field("hold_ms", &self.inner.hold_ms)
            .finish()
    }
}

impl<F, A, T, E> AsyncOnce<F, A, T, E> {
    pub fn kind(&self) -> WrapperKind {
        WrapperKind::AsyncOnce
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn stats(&self) -> CallStats {
        self.inner.stats.snapshot(self.inner.flight.in_flight())
    }
}

impl<F, Fut, A, T, E> AsyncOnce<F, A, T, E>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    A: Serialize + Send + 'static,
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(func: F, hold_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(OnceInner {
                func,
                flight: Flight::default(),
                clock,
                hold_ms,
                settled: Mutex::new(HashMap::new()),
                stats: StatsRecorder::default(),
            }),
            _args: PhantomData,
        }
    }

    // == Call ==
    /// Calls the wrapped function unless an identical call is running or has
    /// settled within the hold window.
    pub async fn call(&self, args: A) -> Result<T, MemoError<E>> {
        let inner = &self.inner;
        inner.stats.record_call();
        let key = call_key(&args)?;

        if let Some(outcome) = inner.retained(&key) {
            inner.stats.record_cache_hit();
            return outcome.map_err(MemoError::Call);
        }

        let settlement = match inner.flight.join(&key) {
            Joined::Follower(settlement) => {
                inner.stats.record_coalesced();
                settlement
            }
            Joined::Leader(settlement) => {
                // The previous leader may have settled between the check above and joining.
                if let Some(outcome) = inner.retained(&key) {
                    inner.stats.record_cache_hit();
                    inner.flight.settle(&key, outcome);
                } else {
                    inner.stats.record_invocation();
                    Self::spawn_invocation(Arc::clone(inner), key, args);
                }
                settlement
            }
        };

        wait(settlement).await
    }

    fn spawn_invocation(inner: Arc<OnceInner<F, T, E>>, key: String, args: A) {
        tokio::spawn(async move {
            let guard = AbandonGuard::new(&inner.flight, &key);
            let outcome = (inner.func)(args).await;
            if outcome.is_err() {
                inner.stats.record_failure();
            }

            inner.retain(&key, &outcome);
            guard.disarm();
            let notified = inner.flight.settle(&key, outcome);
            debug!("Settled once-call {} for {} caller(s)", key, notified);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn flaky(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn((i32,)) -> std::future::Ready<Result<i32, String>> + Send + Sync + 'static {
        move |(value,)| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if value < 0 {
                Err("negative".to_string())
            } else {
                Ok(value)
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let once = AsyncOnce::new(
            move |(value,): (u32,)| {
                seen.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, String>(value + 1)
                }
            },
            0,
            Arc::new(ManualClock::new(0)),
        );

        let (a, b) = tokio::join!(once.call((1,)), once.call((1,)));
        assert_eq!((a, b), (Ok(2), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(once.kind(), WrapperKind::AsyncOnce);
    }

    #[tokio::test]
    async fn test_outcomes_replayed_within_hold() {
        let clock = ManualClock::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let once = AsyncOnce::new(flaky(Arc::clone(&calls)), 1_000, Arc::new(clock.clone()));

        assert_eq!(once.call((4,)).await, Ok(4));
        assert_eq!(once.call((-1,)).await, Err(MemoError::Call("negative".to_string())));

        clock.advance(500);
        assert_eq!(once.call((4,)).await, Ok(4));
        assert_eq!(once.call((-1,)).await, Err(MemoError::Call("negative".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(once.stats().cache_hits, 2);

        clock.advance(1_000);
        assert_eq!(once.call((4,)).await, Ok(4));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_hold_retains_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let once = AsyncOnce::new(flaky(Arc::clone(&calls)), 0, Arc::new(ManualClock::new(0)));

        once.call((1,)).await.unwrap();
        once.call((1,)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lapsed_outcomes_are_released() {
        let clock = ManualClock::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let once = AsyncOnce::new(flaky(Arc::clone(&calls)), 10, Arc::new(clock.clone()));

        for value in 0..1_000 {
            once.call((value,)).await.unwrap();
        }
        assert_eq!(once.inner.settled.lock().len(), 1_000);

        clock.advance(1_000_000);
        once.call((5_000,)).await.unwrap();
        assert_eq!(once.inner.settled.lock().len(), 1);
    }
}
