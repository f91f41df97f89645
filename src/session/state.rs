//! Observable session state and the readiness signal.
//!
//! DESIGN
//! ======
//! `SessionStore` owns the only `watch::Sender<SessionState>`; the
//! controller is the sole writer and everyone else reads snapshots or
//! subscribes. Transitions keep `user.is_some() == authenticated` and never
//! move `ready` back to `false`.
//!
//! `ReadySignal` is a one-shot broadcast: waiters queue in registration
//! order and are released together, exactly once. Waiting after release
//! returns immediately.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, watch};

/// Authentication status of the current user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    /// First authentication-status determination has completed.
    pub ready: bool,
    pub authenticated: bool,
    /// Present exactly when `authenticated`.
    pub user: Option<Value>,
}

// =============================================================================
// STORE
// =============================================================================

pub(crate) struct SessionStore {
    tx: watch::Sender<SessionState>,
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::default());
        Self { tx }
    }

    pub(crate) fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub(crate) fn mark_ready(&self) {
        self.tx.send_if_modified(|state| {
            if state.ready {
                return false;
            }
            state.ready = true;
            true
        });
    }

    pub(crate) fn set_authenticated(&self, user: Value) {
        self.tx.send_modify(|state| {
            state.authenticated = true;
            state.user = Some(user);
        });
    }

    pub(crate) fn set_unauthenticated(&self) {
        self.tx.send_if_modified(|state| {
            if !state.authenticated && state.user.is_none() {
                return false;
            }
            state.authenticated = false;
            state.user = None;
            true
        });
    }

    /// Refresh the user record without touching `authenticated`. Ignored
    /// while unauthenticated so `user` never appears without a session.
    pub(crate) fn set_user(&self, user: Value) -> bool {
        self.tx.send_if_modified(|state| {
            if !state.authenticated {
                return false;
            }
            state.user = Some(user);
            true
        })
    }
}

// =============================================================================
// READY SIGNAL
// =============================================================================

#[derive(Default)]
struct ReadyInner {
    released: bool,
    waiters: Vec<oneshot::Sender<()>>,
}

#[derive(Default)]
pub(crate) struct ReadySignal {
    inner: Mutex<ReadyInner>,
}

impl ReadySignal {
    pub(crate) fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Resolve once `release` has run; immediately if it already has.
    pub(crate) async fn wait(&self) {
        let waiter = {
            let mut inner = self.lock();
            if inner.released {
                return;
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            rx
        };
        if waiter.await.is_err() {
            tracing::warn!("ready signal dropped before release");
        }
    }

    /// Release every queued waiter in registration order. Returns `false`
    /// if the signal was already released.
    pub(crate) fn release(&self) -> bool {
        let waiters = {
            let mut inner = self.lock();
            if inner.released {
                return false;
            }
            inner.released = true;
            std::mem::take(&mut inner.waiters)
        };
        let queued = waiters.len();
        let delivered = waiters.into_iter().map(|tx| tx.send(())).filter(Result::is_ok).count();
        tracing::trace!(queued, delivered, "ready waiters released");
        true
    }

    fn lock(&self) -> MutexGuard<'_, ReadyInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
