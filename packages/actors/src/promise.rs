//! Single-resolution async result with cooperative cancellation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;

/// Why waiting on a promise did not yield a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromiseError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("promise rejected: {0}")]
    Rejected(String),
}

type CancelCallback = Box<dyn FnOnce() + Send + 'static>;

struct State<T> {
    outcome: Option<Result<T, PromiseError>>,
    cancel_callbacks: Vec<CancelCallback>,
    cancel_requested: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    settled: Notify,
}

/// A write-once container for a `T`.
///
/// Clones share the same slot: any clone may complete, cancel or wait.
/// The first of [`complete`](Self::complete) / [`fail`](Self::fail) wins and
/// every later call is a no-op.
pub struct CancellablePromise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CancellablePromise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for CancellablePromise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CancellablePromise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("CancellablePromise")
            .field("done", &state.outcome.is_some())
            .field("cancel_requested", &state.cancel_requested)
            .finish()
    }
}

impl<T> CancellablePromise<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    outcome: None,
                    cancel_callbacks: Vec::new(),
                    cancel_requested: false,
                }),
                settled: Notify::new(),
            }),
        }
    }

    /// A promise that is already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        let promise = Self::new();
        promise.complete(value);
        promise
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve with `value`. Returns `false` if already resolved.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject with `error`. Returns `false` if already resolved.
    pub fn fail(&self, error: PromiseError) -> bool {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: Result<T, PromiseError>) -> bool {
        let callbacks = {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
            std::mem::take(&mut state.cancel_callbacks)
        };
        // Dropped outside the lock; callbacks may own other promises.
        drop(callbacks);
        self.inner.settled.notify_waiters();
        true
    }

    pub fn is_done(&self) -> bool {
        self.lock().outcome.is_some()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.lock().cancel_requested
    }

    /// Register a callback run when cancellation is requested.
    ///
    /// Runs immediately if cancellation was already requested, and never if
    /// the promise resolves first.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return;
            }
            if !state.cancel_requested {
                state.cancel_callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Request cancellation.
    ///
    /// Returns `false` once the promise is resolved. Otherwise the registered
    /// callbacks run (once, on the first request) and `true` is returned; the
    /// promise itself stays unresolved until whoever owns the work settles it.
    pub fn cancel(&self) -> bool {
        let callbacks = {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.cancel_requested = true;
            std::mem::take(&mut state.cancel_callbacks)
        };
        for callback in callbacks {
            callback();
        }
        true
    }
}

impl<T: Clone> CancellablePromise<T> {
    /// The outcome, if resolved.
    pub fn try_get(&self) -> Option<Result<T, PromiseError>> {
        self.lock().outcome.clone()
    }

    /// Wait until resolved.
    pub async fn get(&self) -> Result<T, PromiseError> {
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            // Register before checking so a settle in between is not missed.
            notified.as_mut().enable();

            if let Some(outcome) = self.try_get() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Wait until resolved, failing with [`PromiseError::Timeout`] after `timeout`.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<T, PromiseError> {
        tokio::time::timeout(timeout, self.get())
            .await
            .map_err(|_| PromiseError::Timeout(timeout))?
    }
}
