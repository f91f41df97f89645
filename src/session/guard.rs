//! Route classification, the guard decision table, and redirect evaluation.
//!
//! SYSTEM CONTEXT
//! ==============
//! `RouteGuard` vetoes proposed navigations; `RedirectEvaluator` relocates
//! the user when the session changes underneath the current view (login or
//! logout without a navigation). Both apply the same pure `decide` table so
//! they can never disagree.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::state::SessionState;
use crate::config::{AuthMeta, Config, NEXT_URL_PARAM, Redirects};
use crate::navigation::{GuardDecision, Location, NavigationGuard, Navigator, RouteTarget};

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Access policy of a location, derived from its matched route chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Some record carries the "authenticated" sentinel.
    Protected,
    /// Some record carries the "unauthenticated" sentinel.
    AnonymousOnly,
    Public,
}

impl RouteClass {
    /// Classify `location`. Protected is checked first and wins when a
    /// chain carries both sentinels.
    #[must_use]
    pub fn of(location: &Location, meta: &AuthMeta) -> Self {
        if location.meta_values(&meta.key).any(|value| *value == meta.authenticated) {
            Self::Protected
        } else if location.meta_values(&meta.key).any(|value| *value == meta.unauthenticated) {
            Self::AnonymousOnly
        } else {
            Self::Public
        }
    }
}

/// Apply the guard table to `location` under `state`.
#[must_use]
pub fn decide(class: RouteClass, state: &SessionState, location: &Location, redirects: &Redirects) -> GuardDecision {
    if !state.ready {
        return GuardDecision::Allow;
    }
    match (class, state.authenticated) {
        (RouteClass::Protected, false) => GuardDecision::Redirect(login_target(redirects, location)),
        (RouteClass::AnonymousOnly, true) => GuardDecision::Redirect(redirects.authenticated.clone()),
        _ => GuardDecision::Allow,
    }
}

/// The unauthenticated target carrying the attempted path as `nextUrl`.
/// A `nextUrl` already configured on the target is kept.
fn login_target(redirects: &Redirects, location: &Location) -> RouteTarget {
    let mut target = redirects.unauthenticated.clone();
    target
        .params
        .entry(NEXT_URL_PARAM.to_owned())
        .or_insert_with(|| location.full_path.clone());
    target
}

// =============================================================================
// ROUTE GUARD
// =============================================================================

/// Navigation guard backed by a live view of the session.
pub struct RouteGuard {
    config: Arc<Config>,
    state: watch::Receiver<SessionState>,
}

impl RouteGuard {
    #[must_use]
    pub fn new(config: Arc<Config>, state: watch::Receiver<SessionState>) -> Self {
        Self { config, state }
    }
}

impl NavigationGuard for RouteGuard {
    fn check(&self, to: &Location, _from: &Location) -> GuardDecision {
        let state = self.state.borrow().clone();
        let class = RouteClass::of(to, &self.config.auth_meta);
        let decision = decide(class, &state, to, &self.config.redirects);
        if let GuardDecision::Redirect(target) = &decision {
            tracing::debug!(to = %to.full_path, ?class, ?target, "navigation intercepted");
        }
        decision
    }
}

// =============================================================================
// REDIRECT EVALUATOR
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct PushedRedirect {
    from: String,
    target: RouteTarget,
}

/// Re-checks the current location and pushes a redirect when the session
/// no longer permits it. Re-running for the same location and target is a
/// no-op until the location changes.
#[derive(Clone)]
pub struct RedirectEvaluator {
    config: Arc<Config>,
    state: watch::Receiver<SessionState>,
    navigator: Arc<dyn Navigator>,
    last: Arc<Mutex<Option<PushedRedirect>>>,
}

impl RedirectEvaluator {
    #[must_use]
    pub fn new(config: Arc<Config>, state: watch::Receiver<SessionState>, navigator: Arc<dyn Navigator>) -> Self {
        Self { config, state, navigator, last: Arc::new(Mutex::new(None)) }
    }

    /// Evaluate the current location, returning the redirect pushed, if any.
    pub async fn evaluate(&self) -> Option<RouteTarget> {
        let location = self.navigator.current_location();
        let state = self.state.borrow().clone();
        let class = RouteClass::of(&location, &self.config.auth_meta);

        let GuardDecision::Redirect(target) = decide(class, &state, &location, &self.config.redirects) else {
            self.lock().take();
            return None;
        };

        let pending = PushedRedirect { from: location.full_path.clone(), target: target.clone() };
        {
            let mut last = self.lock();
            if last.as_ref() == Some(&pending) {
                return None;
            }
            *last = Some(pending);
        }

        tracing::info!(from = %location.full_path, ?class, ?target, "session change requires redirect");
        match self.navigator.push(target.clone()).await {
            Ok(landed) => {
                tracing::debug!(to = %landed.full_path, "redirect committed");
                Some(target)
            }
            Err(e) => {
                tracing::warn!(error = %e, "redirect push failed");
                self.lock().take();
                None
            }
        }
    }

    /// Evaluate on every session change until the state sender is dropped.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        let mut changes = self.state.clone();
        changes.borrow_and_update();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                self.evaluate().await;
            }
            tracing::debug!("session state closed; redirect evaluator stopped");
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<PushedRedirect>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
