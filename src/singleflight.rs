//! Request coalescing for concurrent lookups of the same key.
//!
//! When many callers miss on the same key at once, only the first one starts
//! the load. It runs on its own task and publishes its outcome on a `watch`
//! channel; every caller, the one that started it included, receives a clone
//! of that outcome, error included. Nothing is remembered after the call
//! finishes: the next caller starts a fresh load.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{trace, warn};

/// Published once by the call's task; `None` until then.
type Outcome<T> = Option<Result<T>>;

type Registry<T> = Mutex<HashMap<String, watch::Receiver<Outcome<T>>>>;

enum Role<T> {
    Leader(watch::Sender<Outcome<T>>),
    Follower(watch::Receiver<Outcome<T>>),
}

/// Collapses concurrent calls sharing a key into one execution.
pub struct SingleFlight<T> {
    calls: Arc<Registry<T>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty coalescer.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `f` for `key`, or join the call already in flight for it.
    ///
    /// The future returned by `f` runs on its own task, so dropping any
    /// caller, the first one included, leaves the call running for the
    /// others. Its registry entry is removed before the outcome is
    /// published, so callers arriving afterwards start a new call. If the
    /// call panics, the caller that started it gets [`Error::Internal`] and
    /// the other waiting callers retry with their own `f`.
    pub async fn work<F, Fut>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        loop {
            let role = {
                let mut calls = self.calls.lock();
                match calls.get(key).cloned() {
                    Some(rx) => Role::Follower(rx),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        calls.insert(key.to_owned(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let rx = tx.subscribe();
                    self.spawn_call(key, tx, f());
                    return match Self::wait(rx).await {
                        Some(outcome) => outcome,
                        None => {
                            warn!(key, "coalesced call panicked");
                            Err(Error::Internal(format!("load of {} panicked", key)))
                        }
                    };
                }
                Role::Follower(rx) => {
                    if let Some(outcome) = Self::wait(rx).await {
                        return outcome;
                    }
                    trace!(key, "in-flight call abandoned, retrying");
                }
            }
        }
    }

    /// Number of calls currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn spawn_call<Fut>(&self, key: &str, tx: watch::Sender<Outcome<T>>, call: Fut)
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        // Created before spawning so an unpolled task still deregisters.
        let guard = CallGuard {
            calls: self.calls.clone(),
            key: key.to_owned(),
        };

        tokio::spawn(async move {
            let result = call.await;
            drop(guard);
            tx.send_replace(Some(result));
        });
    }

    async fn wait(mut rx: watch::Receiver<Outcome<T>>) -> Option<Result<T>> {
        // Err means the call's task went away without publishing.
        let outcome = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };
        outcome
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.calls.lock().len())
            .finish()
    }
}

/// Deregisters a call on every exit path, unwinding included.
struct CallGuard<T> {
    calls: Arc<Registry<T>>,
    key: String,
}

impl<T> Drop for CallGuard<T> {
    fn drop(&mut self) {
        self.calls.lock().remove(&self.key);
    }
}
