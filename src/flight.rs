//! Call collapsing: at most one in-flight execution per key.
//!
//! The first caller for a key becomes the leader and runs the work. Callers
//! that arrive while the leader is running wait on a per-call watch channel
//! and receive a clone of the leader's result. The record is dropped as soon
//! as the leader finishes, so a later call for the same key runs the work
//! again. Nothing is cached here.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::error::CacheError;

type Outcome<V> = Option<Result<V, CacheError>>;

enum Role<V> {
    Leader(watch::Sender<Outcome<V>>),
    Waiter(watch::Receiver<Outcome<V>>),
}

/// Collapses concurrent calls sharing a key into one execution.
pub struct CallGroup<V> {
    calls: Mutex<HashMap<String, watch::Receiver<Outcome<V>>>>,
}

impl<V: Clone> CallGroup<V> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` for `key` unless a run for `key` is already in flight, in
    /// which case wait for that run and return its result.
    ///
    /// If the leading caller is dropped before `work` completes, one of the
    /// waiters takes over as leader and runs its own `work`, so a cancelled
    /// caller never fails the others.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CacheError>>,
    {
        let tx = loop {
            match self.claim(key) {
                Role::Leader(tx) => break tx,
                Role::Waiter(mut rx) => {
                    debug!(key, "Joining in-flight call");
                    let shared = match rx.wait_for(|outcome| outcome.is_some()).await {
                        Ok(outcome) => (*outcome).clone(),
                        Err(_) => None,
                    };
                    match shared {
                        Some(result) => return result,
                        None => debug!(key, "In-flight call dropped by its leader, retrying"),
                    }
                }
            }
        };

        let leader = Leader {
            calls: &self.calls,
            key,
            tx,
        };
        let result = work().await;
        leader.tx.send_replace(Some(result.clone()));
        result
    }

    /// Number of keys with a call currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn claim(&self, key: &str) -> Role<V> {
        let mut calls = self.calls.lock();
        if let Some(rx) = calls.get(key) {
            return Role::Waiter(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        calls.insert(key.to_string(), rx);
        Role::Leader(tx)
    }
}

impl<V: Clone> Default for CallGroup<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for CallGroup<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallGroup")
            .field("in_flight", &self.calls.lock().len())
            .finish()
    }
}

/// Removes the in-flight record when the leader finishes or is dropped.
struct Leader<'a, V> {
    calls: &'a Mutex<HashMap<String, watch::Receiver<Outcome<V>>>>,
    key: &'a str,
    tx: watch::Sender<Outcome<V>>,
}

impl<V> Drop for Leader<'_, V> {
    fn drop(&mut self) {
        self.calls.lock().remove(self.key);
    }
}
