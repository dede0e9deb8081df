//! Memoizer Module
//!
//! Context object that owns the host backends, default options and the
//! registry of memoized functions.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::Host;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::memo::hash::source_hash;
use crate::memo::once::AsyncOnce;
use crate::memo::wrapper::{MemoOptions, Memoized};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HistoryKey {
    Type(TypeId),
    Source(String),
}

type Registered = Arc<dyn Any + Send + Sync>;

// == Memoizer ==
/// Builds memoized wrappers over one [`Host`].
///
/// Wrappers made with the `*_with_history` methods are remembered, so wrapping
/// the same function again hands back the instance made the first time.
pub struct Memoizer {
    host: Host,
    defaults: MemoOptions,
    history: Mutex<HashMap<HistoryKey, Registered>>,
}

impl fmt::Debug for Memoizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("host", &self.host)
            .field("defaults", &self.defaults)
            .field("registered", &self.registered())
            .finish()
    }
}

impl Default for Memoizer {
    fn default() -> Self {
        Self::new(Host::default())
    }
}

impl Memoizer {
    // == Constructors ==
    pub fn new(host: Host) -> Self {
        Self::with_defaults(host, MemoOptions::default())
    }

    pub fn with_defaults(host: Host, defaults: MemoOptions) -> Self {
        Self {
            host,
            defaults,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the host and default options described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::with_defaults(config.host()?, config.memo_options()))
    }

    // == Accessors ==
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// A copy of the defaults, to customise for [`Memoizer::wrap`].
    pub fn options(&self) -> MemoOptions {
        self.defaults.clone()
    }

    /// Number of remembered wrappers.
    pub fn registered(&self) -> usize {
        self.history.lock().len()
    }

    /// Drops every remembered wrapper. Existing handles keep working.
    pub fn forget_all(&self) {
        self.history.lock().clear();
    }

    // == Wrapping ==
    /// Wraps `func` with explicit options.
    ///
    /// # Errors
    /// [`CacheError::Configuration`] if `options.storage` is unavailable on
    /// this host.
    pub fn wrap<F, Fut, A, T, E>(&self, func: F, options: MemoOptions) -> Result<Memoized<F, A, T, E>>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        A: Serialize + Send + 'static,
        T: Serialize + DeserializeOwned + Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        Memoized::new(func, options, &self.host)
    }

    /// Wraps `func` with the defaults, returning the remembered wrapper if this
    /// function type was wrapped before.
    pub fn wrap_with_history<F, Fut, A, T, E>(&self, func: F) -> Result<Memoized<F, A, T, E>>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        A: Serialize + Send + 'static,
        T: Serialize + DeserializeOwned + Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        self.remember(HistoryKey::Type(TypeId::of::<F>()), || {
            Memoized::new(func, self.options(), &self.host)
        })
    }

    /// Like [`Memoizer::wrap_with_history`], but remembered under the hash of
    /// `source`, which can be any text identifying the function.
    ///
    /// # Errors
    /// [`CacheError::Registry`] if `source` was already used for a wrapper of
    /// a different type.
    pub fn wrap_with_history_keyed<F, Fut, A, T, E>(
        &self,
        source: &str,
        func: F,
    ) -> Result<Memoized<F, A, T, E>>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        A: Serialize + Send + 'static,
        T: Serialize + DeserializeOwned + Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        let hash = source_hash(source);
        let options = self.options();
        let options = match options.cache_key {
            Some(_) => options,
            None => options.cache_key(hash.clone()),
        };
        self.remember(HistoryKey::Source(hash), || {
            Memoized::new(func, options, &self.host)
        })
    }

    /// Wraps `func` so settled outcomes are replayed for `hold_ms`.
    pub fn once<F, Fut, A, T, E>(&self, func: F, hold_ms: u64) -> AsyncOnce<F, A, T, E>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        A: Serialize + Send + 'static,
        T: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        AsyncOnce::new(func, hold_ms, self.host.clock())
    }

    fn remember<W>(&self, key: HistoryKey, build: impl FnOnce() -> Result<W>) -> Result<W>
    where
        W: Clone + Send + Sync + 'static,
    {
        let mut history = self.history.lock();
        if let Some(existing) = history.get(&key) {
            debug!("Reusing remembered wrapper for {:?}", key);
            return existing
                .downcast_ref::<W>()
                .cloned()
                .ok_or_else(|| CacheError::Registry(format!("{:?} is registered with another type", key)));
        }

        let wrapper = build()?;
        history.insert(key, Arc::new(wrapper.clone()));
        Ok(wrapper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Storage, StorageKind};

    async fn add_one((x,): (u32,)) -> std::result::Result<u32, String> {
        Ok(x + 1)
    }

    #[tokio::test]
    async fn test_same_function_same_instance() {
        let memoizer = Memoizer::default();
        let first = memoizer.wrap_with_history(add_one).unwrap();
        let second = memoizer.wrap_with_history(add_one).unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(memoizer.registered(), 1);
        assert_eq!(second.call((1,)).await, Ok(2));
    }

    #[test]
    fn test_cloned_closure_is_same_function() {
        let memoizer = Memoizer::default();
        let triple = |(x,): (u32,)| async move { Ok::<_, String>(x * 3) };
        let a = memoizer.wrap_with_history(triple).unwrap();
        let b = memoizer.wrap_with_history(triple).unwrap();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_distinct_functions_distinct_instances() {
        let memoizer = Memoizer::default();
        memoizer.wrap_with_history(add_one).unwrap();
        memoizer
            .wrap_with_history(|(x,): (u32,)| async move { Ok::<_, String>(x) })
            .unwrap();
        assert_eq!(memoizer.registered(), 2);
    }

    #[test]
    fn test_keyed_history_ignores_whitespace() {
        let memoizer = Memoizer::default();
        let a = memoizer
            .wrap_with_history_keyed("async (x) => x + 1", add_one)
            .unwrap();
        let b = memoizer
            .wrap_with_history_keyed("async (x)  =>\n  x + 1", add_one)
            .unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.cache_key(), source_hash("async (x) => x + 1"));
    }

    #[test]
    fn test_keyed_history_type_mismatch() {
        let memoizer = Memoizer::default();
        memoizer.wrap_with_history_keyed("fetch", add_one).unwrap();
        let err = memoizer
            .wrap_with_history_keyed("fetch", |(x,): (u32,)| async move { Ok::<_, String>(x) })
            .unwrap_err();
        assert!(matches!(err, CacheError::Registry(_)));
    }

    #[test]
    fn test_failed_wrap_is_not_remembered() {
        let memoizer = Memoizer::with_defaults(
            Host::headless(),
            MemoOptions::new().storage(StorageKind::Local),
        );
        assert!(memoizer.wrap_with_history(add_one).is_err());
        assert_eq!(memoizer.registered(), 0);
    }

    #[test]
    fn test_forget_all() {
        let memoizer = Memoizer::default();
        let first = memoizer.wrap_with_history(add_one).unwrap();
        memoizer.forget_all();
        let second = memoizer.wrap_with_history(add_one).unwrap();
        assert!(!first.ptr_eq(&second));
    }

    #[tokio::test]
    async fn test_wrap_uses_explicit_options() {
        let memoizer = Memoizer::default();
        let wrapped = memoizer
            .wrap(add_one, memoizer.options().storage(StorageKind::Memory).cache_key("inc"))
            .unwrap();
        assert_eq!(wrapped.call((4,)).await, Ok(5));
        assert!(memoizer.host().memory().get_item("inc-[4]").unwrap().is_some());
        assert_eq!(memoizer.registered(), 0);
    }
}
