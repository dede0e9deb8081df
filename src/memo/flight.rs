//! Pending Call Module
//!
//! Per-argument bookkeeping that lets concurrent identical calls share one
//! in-flight invocation.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::MemoError;

type Waiter<T, E> = oneshot::Sender<Result<T, E>>;
pub(crate) type Settlement<T, E> = oneshot::Receiver<Result<T, E>>;

// == Joined ==
/// Role a caller got when it joined the record for its arguments.
pub(crate) enum Joined<T, E> {
    /// First caller: must produce the outcome
    Leader(Settlement<T, E>),
    /// An invocation is already running: just wait
    Follower(Settlement<T, E>),
}

// == Flight ==
/// Map from call key to the callers waiting on it.
///
/// A record exists exactly while its call is pending. Waiters are notified in
/// the order they joined, and the record is removed under the same lock, so a
/// later caller can never join a call that has already settled.
pub(crate) struct Flight<T, E> {
    calls: Mutex<HashMap<String, Vec<Waiter<T, E>>>>,
}

impl<T, E> Default for Flight<T, E> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone, E: Clone> Flight<T, E> {
    /// Queues a waiter for `key`, creating the record if there is none.
    pub fn join(&self, key: &str) -> Joined<T, E> {
        let (tx, rx) = oneshot::channel();
        let mut calls = self.calls.lock();
        match calls.get_mut(key) {
            Some(waiters) => {
                waiters.push(tx);
                Joined::Follower(rx)
            }
            None => {
                calls.insert(key.to_string(), vec![tx]);
                Joined::Leader(rx)
            }
        }
    }

    /// Delivers `outcome` to every waiter on `key` and drops the record.
    ///
    /// Returns the number of waiters notified.
    pub fn settle(&self, key: &str, outcome: Result<T, E>) -> usize {
        let mut calls = self.calls.lock();
        let Some(waiters) = calls.remove(key) else {
            return 0;
        };
        let count = waiters.len();
        for waiter in waiters {
            // A dropped receiver only means that caller stopped waiting.
            let _ = waiter.send(outcome.clone());
        }
        count
    }
}

impl<T, E> Flight<T, E> {
    /// Drops the record without an outcome; waiters observe an abandoned call.
    pub fn abandon(&self, key: &str) {
        self.calls.lock().remove(key);
    }

    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

// == Abandon Guard ==
/// Abandons the record for `key` if dropped while still armed, e.g. when the
/// invocation panics.
pub(crate) struct AbandonGuard<'a, T, E> {
    flight: &'a Flight<T, E>,
    key: &'a str,
    armed: bool,
}

impl<'a, T, E> AbandonGuard<'a, T, E> {
    pub fn new(flight: &'a Flight<T, E>, key: &'a str) -> Self {
        Self {
            flight,
            key,
            armed: true,
        }
    }

    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T, E> Drop for AbandonGuard<'_, T, E> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Invocation for {} ended without settling", self.key);
            self.flight.abandon(self.key);
        }
    }
}

// == Helpers ==
/// Serializes call arguments into the key pending calls and cache cells use.
pub(crate) fn call_key<A: Serialize, E>(args: &A) -> Result<String, MemoError<E>> {
    serde_json::to_string(args).map_err(|err| MemoError::Arguments(err.to_string()))
}

/// Waits for the settlement of a joined call.
pub(crate) async fn wait<T, E>(settlement: Settlement<T, E>) -> Result<T, MemoError<E>> {
    match settlement.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(MemoError::Call(err)),
        Err(_) => Err(MemoError::Abandoned),
    }
}
