//! Memoized Wrapper Module
//!
//! Wraps an async function so identical concurrent calls share one invocation
//! and results can persist in a cache cell.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheCell, Clock, Host, Storage, StorageKind, DEFAULT_VERSION};
use crate::error::{MemoError, Result};
use crate::memo::flight::{call_key, wait, AbandonGuard, Flight, Joined};
use crate::memo::hash::type_key;
use crate::memo::stats::{CallStats, StatsRecorder};

// == Wrapper Kind ==
/// Identifies which wrapper produced a memoized function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperKind {
    /// Coalescing with optional storage-backed caching
    AsyncCache,
    /// Coalescing with in-process retention of the last outcome
    AsyncOnce,
}

impl WrapperKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WrapperKind::AsyncCache => "asyncCache",
            WrapperKind::AsyncOnce => "asyncOnce",
        }
    }
}

// == Memo Options ==
/// Settings for [`Memoized`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoOptions {
    /// Lifetime of stored results in milliseconds, 0 = never expire
    pub expire_time_ms: u64,
    /// Storage key prefix; derived from the function type when `None`.
    /// Set it explicitly when results must survive a rebuild.
    pub cache_key: Option<String>,
    /// Cache version partition
    pub version: String,
    /// Backend for stored results; `None` disables storage (coalescing only)
    pub storage: Option<StorageKind>,
}

impl Default for MemoOptions {
    fn default() -> Self {
        Self {
            expire_time_ms: 0,
            cache_key: None,
            version: DEFAULT_VERSION.to_string(),
            storage: None,
        }
    }
}

impl MemoOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expire_time_ms(mut self, ms: u64) -> Self {
        self.expire_time_ms = ms;
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn storage(mut self, kind: StorageKind) -> Self {
        self.storage = Some(kind);
        self
    }
}

// == Inner State ==
struct Backing {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
}

struct Inner<F, T, E> {
    func: F,
    flight: Flight<T, E>,
    backing: Option<Backing>,
    cache_key: String,
    version: String,
    expire_time_ms: u64,
    stats: StatsRecorder,
}

impl<F, T, E> Inner<F, T, E>
where
    T: Serialize + DeserializeOwned,
{
    fn cell(&self, args_key: &str) -> Option<CacheCell> {
        let backing = self.backing.as_ref()?;
        Some(CacheCell::new(
            Arc::clone(&backing.storage),
            Arc::clone(&backing.clock),
            format!("{}-{}", self.cache_key, args_key),
            self.version.clone(),
            self.expire_time_ms,
        ))
    }

    /// Reads a stored result. `null` payloads and faults count as misses.
    fn lookup(&self, args_key: &str) -> Option<T> {
        let cell = self.cell(args_key)?;
        match cell.get_raw() {
            Ok(Some(raw)) if !raw.is_null() => match serde_json::from_value(raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!("Ignoring undecodable cache entry '{}': {}", cell.cache_key(), err);
                    None
                }
            },
            Ok(_) => None,
            Err(err) => {
                warn!("Cache read failed for '{}': {}", cell.cache_key(), err);
                None
            }
        }
    }

    fn store(&self, args_key: &str, value: &T) {
        let Some(cell) = self.cell(args_key) else {
            return;
        };
        if let Err(err) = cell.set(value) {
            warn!("Cache write failed for '{}': {}", cell.cache_key(), err);
        }
    }
}

// == Memoized ==
/// An async function wrapped with call coalescing and optional result caching.
///
/// Calls are keyed by the JSON serialization of their arguments; pass several
/// arguments as a tuple. At most one invocation per key runs at a time, and
/// every caller that joined it receives a clone of its outcome. The invocation
/// runs as its own tokio task, so dropping a caller never cancels it.
///
/// Clones share state; [`Memoized::ptr_eq`] tells whether two handles are
/// the same wrapper.
pub struct Memoized<F, A, T, E> {
    inner: Arc<Inner<F, T, E>>,
    _args: PhantomData<fn(A)>,
}

impl<F, A, T, E> Clone for Memoized<F, A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _args: PhantomData,
        }
    }
}

impl<F, A, T, E> fmt::Debug for Memoized<F, A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("cache_key", &self.inner.cache_key)
            .field("version", &self.inner.version)
            .field("expire_time_ms", &self.inner.expire_time_ms)
            .field("cached", &self.inner.backing.is_some())
            .finish()
    }
}

impl<F, A, T, E> Memoized<F, A, T, E> {
    pub fn kind(&self) -> WrapperKind {
        WrapperKind::AsyncCache
    }

    /// Returns true if both handles are the same wrapper.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn cache_key(&self) -> &str {
        &self.inner.cache_key
    }

    pub fn stats(&self) -> CallStats {
        self.inner.stats.snapshot(self.inner.flight.in_flight())
    }
}

impl<F, Fut, A, T, E> Memoized<F, A, T, E>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    A: Serialize + Send + 'static,
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    // == Constructor ==
    /// Wraps `func` using the backends of `host`.
    ///
    /// # Errors
    /// [`crate::error::CacheError::Configuration`] if `options.storage` names a
    /// backend the host does not provide.
    pub fn new(func: F, options: MemoOptions, host: &Host) -> Result<Self> {
        let backing = match options.storage {
            Some(kind) => Some(Backing {
                storage: host.storage(kind)?,
                clock: host.clock(),
            }),
            None => None,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                func,
                flight: Flight::default(),
                backing,
                cache_key: options.cache_key.unwrap_or_else(type_key::<F>),
                version: options.version,
                expire_time_ms: options.expire_time_ms,
                stats: StatsRecorder::default(),
            }),
            _args: PhantomData,
        })
    }

    // == Call ==
    /// Calls the wrapped function, sharing an in-flight invocation or a stored
    /// result when one exists for the same arguments.
    ///
    /// # Errors
    /// - [`MemoError::Call`] with the function's error, for every caller that
    ///   joined the failing invocation
    /// - [`MemoError::Arguments`] if `args` cannot be serialized
    /// - [`MemoError::Abandoned`] if the invocation panicked
    pub async fn call(&self, args: A) -> std::result::Result<T, MemoError<E>> {
        let inner = &self.inner;
        inner.stats.record_call();
        let args_key = call_key(&args)?;

        let settlement = match inner.flight.join(&args_key) {
            Joined::Follower(settlement) => {
                inner.stats.record_coalesced();
                debug!("Joined in-flight call {} for {}", args_key, inner.cache_key);
                settlement
            }
            Joined::Leader(settlement) => {
                if let Some(hit) = inner.lookup(&args_key) {
                    inner.stats.record_cache_hit();
                    debug!("Cache hit for {} on {}", args_key, inner.cache_key);
                    inner.flight.settle(&args_key, Ok(hit));
                } else {
                    inner.stats.record_invocation();
                    Self::spawn_invocation(Arc::clone(inner), args_key, args);
                }
                settlement
            }
        };

        wait(settlement).await
    }

    fn spawn_invocation(inner: Arc<Inner<F, T, E>>, args_key: String, args: A) {
        tokio::spawn(async move {
            let guard = AbandonGuard::new(&inner.flight, &args_key);
            let outcome = (inner.func)(args).await;

            match &outcome {
                Ok(value) => inner.store(&args_key, value),
                Err(_) => inner.stats.record_failure(),
            }

            guard.disarm();
            let notified = inner.flight.settle(&args_key, outcome);
            debug!("Settled {} for {} caller(s) on {}", args_key, notified, inner.cache_key);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_options_builder() {
        let options = MemoOptions::new()
            .expire_time_ms(100)
            .cache_key("k")
            .version("v2")
            .storage(StorageKind::Memory);
        assert_eq!(options.expire_time_ms, 100);
        assert_eq!(options.cache_key.as_deref(), Some("k"));
        assert_eq!(options.version, "v2");
        assert_eq!(options.storage, Some(StorageKind::Memory));
        assert_eq!(MemoOptions::default().version, DEFAULT_VERSION);
    }

    #[tokio::test]
    async fn test_concurrent_identical_calls_invoke_once() {
        let calls = counter();
        let seen = Arc::clone(&calls);
        let double = Memoized::new(
            move |(value,): (u32,)| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, String>(value * 2)
                }
            },
            MemoOptions::default(),
            &Host::headless(),
        )
        .unwrap();

        let (a, b, c) = tokio::join!(double.call((5,)), double.call((5,)), double.call((5,)));
        assert_eq!((a, b, c), (Ok(10), Ok(10), Ok(10)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = double.stats();
        assert_eq!(stats.calls, 3);
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.coalesced, 2);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_without_storage_invoke_again() {
        let calls = counter();
        let seen = Arc::clone(&calls);
        let double = Memoized::new(
            move |(value,): (u32,)| {
                seen.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, String>(value * 2) }
            },
            MemoOptions::default(),
            &Host::headless(),
        )
        .unwrap();

        assert_eq!(double.call((5,)).await, Ok(10));
        assert_eq!(double.call((5,)).await, Ok(10));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_arguments_are_independent() {
        let calls = counter();
        let seen = Arc::clone(&calls);
        let echo = Memoized::new(
            move |(value,): (u32,)| {
                seen.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, String>(value)
                }
            },
            MemoOptions::default(),
            &Host::headless(),
        )
        .unwrap();

        let (a, b) = tokio::join!(echo.call((1,)), echo.call((2,)));
        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_reaches_every_queued_caller() {
        let calls = counter();
        let seen = Arc::clone(&calls);
        let check = Memoized::new(
            move |(value,): (i32,)| {
                seen.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    if value < 0 {
                        Err("Negative value".to_string())
                    } else {
                        Ok(value * 2)
                    }
                }
            },
            MemoOptions::default(),
            &Host::headless(),
        )
        .unwrap();

        let (a, b) = tokio::join!(check.call((-5,)), check.call((-5,)));
        assert_eq!(a, Err(MemoError::Call("Negative value".to_string())));
        assert_eq!(b, Err(MemoError::Call("Negative value".to_string())));
        assert_eq!(check.stats().failures, 1);

        // No retry and no stale record: the next call invokes again.
        assert_err!(check.call((-5,)).await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_ok!(check.call((3,)).await);
    }

    #[tokio::test]
    async fn test_stored_result_skips_invocation_until_expiry() {
        let clock = ManualClock::new(1_000_000);
        let host = Host::headless().with_clock(Arc::new(clock.clone()));
        let calls = counter();
        let seen = Arc::clone(&calls);
        let fetch = Memoized::new(
            move |(page,): (u32,)| {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, String>(format!("page-{}-{}", page, n)) }
            },
            MemoOptions::new()
                .storage(StorageKind::Memory)
                .cache_key("k")
                .expire_time_ms(100),
            &host,
        )
        .unwrap();

        let first = fetch.call((1,)).await.unwrap();
        clock.advance(50);
        assert_eq!(fetch.call((1,)).await.unwrap(), first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetch.stats().cache_hits, 1);

        clock.advance(100);
        assert_ne!(fetch.call((1,)).await.unwrap(), first);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Stored under `<cache_key>-<args_key>`
        assert!(host.memory().get_item("k-[1]").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_falsy_results_are_cached_but_null_is_not() {
        let host = Host::headless();
        let calls = counter();
        let seen = Arc::clone(&calls);
        let fetch = Memoized::new(
            move |(zero,): (bool,)| {
                seen.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, String>(if zero { Some(0) } else { None }) }
            },
            MemoOptions::new().storage(StorageKind::Memory).cache_key("falsy"),
            &host,
        )
        .unwrap();

        assert_eq!(fetch.call((true,)).await, Ok(Some(0)));
        assert_eq!(fetch.call((true,)).await, Ok(Some(0)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(fetch.call((false,)).await, Ok(None));
        assert_eq!(fetch.call((false,)).await, Ok(None));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_sibling_closures_get_separate_default_keys() {
        let host = Host::headless();
        let options = MemoOptions::new().storage(StorageKind::Memory);
        let users = Memoized::new(
            |(id,): (u32,)| async move { Ok::<_, String>(format!("user-{}", id)) },
            options.clone(),
            &host,
        )
        .unwrap();
        let orders = Memoized::new(
            |(id,): (u32,)| async move { Ok::<_, String>(format!("order-{}", id)) },
            options,
            &host,
        )
        .unwrap();

        assert_ne!(users.cache_key(), orders.cache_key());
        assert_eq!(users.call((1,)).await, Ok("user-1".to_string()));
        assert_eq!(orders.call((1,)).await, Ok("order-1".to_string()));
        assert_eq!(host.memory().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails_at_wrap_time() {
        let result = Memoized::new(
            |(x,): (u32,)| async move { Ok::<_, String>(x) },
            MemoOptions::new().storage(StorageKind::Local),
            &Host::headless(),
        );
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), crate::cache::NO_HOST_STORAGE);
    }

    #[tokio::test]
    async fn test_panicking_invocation_is_abandoned() {
        let boom = Memoized::new(
            |(fail,): (bool,)| async move {
                if fail {
                    panic!("invocation exploded");
                }
                Ok::<_, String>(1)
            },
            MemoOptions::default(),
            &Host::headless(),
        )
        .unwrap();

        assert_eq!(boom.call((true,)).await, Err(MemoError::Abandoned));
        assert_eq!(boom.stats().in_flight, 0);
        assert_eq!(boom.call((false,)).await, Ok(1));
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_invocation() {
        let calls = counter();
        let seen = Arc::clone(&calls);
        let slow = Memoized::new(
            move |(): ()| {
                let seen = Arc::clone(&seen);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                }
            },
            MemoOptions::default(),
            &Host::headless(),
        )
        .unwrap();

        let abandoned = tokio::time::timeout(Duration::from_millis(1), slow.call(())).await;
        assert!(abandoned.is_err());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(slow.stats().in_flight, 0);
    }

    #[test]
    fn test_kind_and_identity() {
        let wrapped = Memoized::new(
            |(x,): (u32,)| async move { Ok::<_, String>(x) },
            MemoOptions::default(),
            &Host::headless(),
        )
        .unwrap();
        let alias = wrapped.clone();
        assert_eq!(wrapped.kind(), WrapperKind::AsyncCache);
        assert_eq!(wrapped.kind().as_str(), "asyncCache");
        assert!(wrapped.ptr_eq(&alias));
        assert!(!wrapped.cache_key().is_empty());
    }
}
