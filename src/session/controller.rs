//! Session controller — orchestrates initialize, login, refresh, and logout.
//!
//! DESIGN
//! ======
//! The controller is a cheap `Clone` handle over shared state. It is the
//! only writer of [`SessionState`]; every operation ends with a redirect
//! evaluation so a login or logout relocates the user even without a
//! navigation.
//!
//! Navigation wiring runs once, in the background, after the first
//! successful `initialize`: wait for the navigator, install the
//! [`RouteGuard`], start the evaluator subscription, evaluate once. Until
//! wiring completes, operations skip redirect evaluation; the wiring pass
//! covers whatever happened in between.
//!
//! The background tasks never hold a strong reference to the controller.
//! Dropping the last handle aborts the evaluator subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::guard::{RedirectEvaluator, RouteGuard};
use super::state::{ReadySignal, SessionState, SessionStore};
use crate::config::{Config, ConfigOverrides, DEFAULT_HTTP_DRIVER, EndpointName};
use crate::drivers::http::{Transport, reqwest_factory};
use crate::drivers::{DriverFactory, Drivers, Http};
use crate::error::{DriverError, SessionError};
use crate::navigation::Navigator;

// =============================================================================
// ACTIONS
// =============================================================================

/// A controller operation as a value, for message-style callers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    Initialize,
    AttemptLogin(Value),
    FetchUser,
    Logout,
}

impl SessionAction {
    /// Operation name as exposed to UI bindings (`attemptLogin`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::AttemptLogin(_) => "attemptLogin",
            Self::FetchUser => "fetchUser",
            Self::Logout => "logout",
        }
    }
}

/// Result of a dispatched [`SessionAction`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Initialized,
    /// The (transformed) user returned by login or refresh.
    User(Value),
    LoggedOut,
}

// =============================================================================
// BUILDER
// =============================================================================

/// Assembles a [`SessionController`]. A navigator is required.
#[derive(Default)]
pub struct SessionControllerBuilder {
    config: Option<Config>,
    navigator: Option<Arc<dyn Navigator>>,
    http_drivers: Vec<(String, DriverFactory<Http>)>,
}

impl SessionControllerBuilder {
    /// Use a fully resolved configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Resolve `overrides` onto the defaults.
    #[must_use]
    pub fn overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.config = Some(Config::resolve(overrides));
        self
    }

    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Register an additional transport factory. Registering under
    /// `"reqwest"` replaces the built-in driver.
    #[must_use]
    pub fn http_driver<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Config) -> Result<Arc<dyn Transport>, DriverError> + Send + Sync + 'static,
    {
        let factory: DriverFactory<Http> = Arc::new(factory);
        self.http_drivers.push((name.into(), factory));
        self
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] when no navigator was supplied.
    pub fn build(self) -> Result<SessionController, SessionError> {
        let navigator = self
            .navigator
            .ok_or_else(|| SessionError::Configuration("a navigator is required".into()))?;
        let config = Arc::new(self.config.unwrap_or_default());

        let drivers = Drivers::new(Arc::clone(&config));
        drivers.register::<Http, _>(DEFAULT_HTTP_DRIVER, reqwest_factory);
        for (name, factory) in self.http_drivers {
            drivers.register_factory::<Http>(name, factory);
        }
        drivers.select::<Http>(config.http.driver.clone());

        let store = SessionStore::new();
        let evaluator = RedirectEvaluator::new(Arc::clone(&config), store.subscribe(), Arc::clone(&navigator));

        tracing::debug!(driver = %config.http.driver, namespace = %config.store_prefix(None), "session controller built");
        Ok(SessionController {
            inner: Arc::new(ControllerInner {
                config,
                drivers,
                store,
                navigator,
                evaluator,
                ready: ReadySignal::default(),
                wired: ReadySignal::default(),
                wiring_started: AtomicBool::new(false),
                subscription: Mutex::new(None),
            }),
        })
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

struct ControllerInner {
    config: Arc<Config>,
    drivers: Drivers,
    store: SessionStore,
    navigator: Arc<dyn Navigator>,
    evaluator: RedirectEvaluator,
    ready: ReadySignal,
    wired: ReadySignal,
    wiring_started: AtomicBool,
    subscription: Mutex<Option<JoinHandle<()>>>,
}

impl ControllerInner {
    fn subscription(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.subscription.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        if let Some(handle) = self.subscription().take() {
            handle.abort();
        }
    }
}

/// Handle to a session. Clones share the same state.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    #[must_use]
    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::default()
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Determine the initial authentication status.
    ///
    /// A failed user request means "no session": the state becomes
    /// unauthenticated and no error is returned. Readiness is marked and
    /// waiters are released before navigation wiring starts.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::CsrfBootstrap`] if CSRF priming fails (the
    /// session then stays not-ready), or [`SessionError::Driver`] if the
    /// active transport cannot be resolved.
    pub async fn initialize(&self) -> Result<(), SessionError> {
        let inner = &self.inner;
        if inner.config.api_endpoints.set_csrf_cookie.is_some() {
            let transport = inner.drivers.get::<Http>()?;
            if let Err(e) = transport.request(EndpointName::SetCsrfCookie, None).await {
                tracing::warn!(error = %e, "csrf cookie priming failed");
                return Err(SessionError::CsrfBootstrap(e));
            }
        }

        match self.request(EndpointName::FetchUser, None).await {
            Ok(user) => {
                inner.store.set_authenticated(user);
                tracing::info!("session restored");
            }
            Err(SessionError::Transport(e)) => {
                tracing::debug!(error = %e, "no active session");
                inner.store.set_unauthenticated();
            }
            Err(e) => return Err(e),
        }

        inner.store.mark_ready();
        if inner.ready.release() {
            tracing::info!(authenticated = inner.store.snapshot().authenticated, "session ready");
        }
        self.wire_navigation();
        Ok(())
    }

    /// Log in with `credentials`, returning the user.
    ///
    /// # Errors
    ///
    /// Returns the transport (or driver) error unchanged; the session is
    /// left unauthenticated.
    pub async fn attempt_login(&self, credentials: Value) -> Result<Value, SessionError> {
        let result = self.request(EndpointName::AttemptLogin, Some(&credentials)).await;
        match &result {
            Ok(user) => {
                self.inner.store.set_authenticated(user.clone());
                tracing::info!("login succeeded");
            }
            Err(e) => {
                self.inner.store.set_unauthenticated();
                tracing::info!(error = %e, "login failed");
            }
        }
        self.evaluate_redirects().await;
        result
    }

    /// Refresh the user record. Does not change `authenticated`.
    ///
    /// # Errors
    ///
    /// Propagates any transport or driver failure.
    pub async fn fetch_user(&self) -> Result<Value, SessionError> {
        let result = self.request(EndpointName::FetchUser, None).await;
        if let Ok(user) = &result {
            if !self.inner.store.set_user(user.clone()) {
                tracing::debug!("user refresh ignored without a session");
            }
        }
        self.evaluate_redirects().await;
        result
    }

    /// End the session. State changes only when the server confirms.
    ///
    /// # Errors
    ///
    /// Propagates any transport or driver failure; the session is unchanged.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let result = self.request(EndpointName::Logout, None).await;
        match &result {
            Ok(_) => {
                self.inner.store.set_unauthenticated();
                tracing::info!("logged out");
            }
            Err(e) => tracing::info!(error = %e, "logout failed"),
        }
        self.evaluate_redirects().await;
        result.map(|_| ())
    }

    /// Run `action` and wrap its result.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation returns.
    #[tracing::instrument(skip(self, action), fields(op = %self.inner.config.store_prefix(Some(action.name()))))]
    pub async fn dispatch(&self, action: SessionAction) -> Result<SessionOutcome, SessionError> {
        match action {
            SessionAction::Initialize => self.initialize().await.map(|()| SessionOutcome::Initialized),
            SessionAction::AttemptLogin(credentials) => self.attempt_login(credentials).await.map(SessionOutcome::User),
            SessionAction::FetchUser => self.fetch_user().await.map(SessionOutcome::User),
            SessionAction::Logout => self.logout().await.map(|()| SessionOutcome::LoggedOut),
        }
    }

    // -------------------------------------------------------------------------
    // Readiness
    // -------------------------------------------------------------------------

    /// Resolves once the first `initialize` has settled.
    pub async fn is_ready(&self) {
        self.inner.ready.wait().await;
    }

    /// Resolves once the route guard and redirect subscription are installed.
    pub async fn navigation_wired(&self) {
        self.inner.wired.wait().await;
    }

    // -------------------------------------------------------------------------
    // Getters
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn ready(&self) -> bool {
        self.inner.store.snapshot().ready
    }

    /// Whether a user is authenticated.
    #[must_use]
    pub fn check(&self) -> bool {
        self.inner.store.snapshot().authenticated
    }

    #[must_use]
    pub fn user(&self) -> Option<Value> {
        self.inner.store.snapshot().user
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.inner.store.snapshot()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.store.subscribe()
    }

    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.inner.config
    }

    #[must_use]
    pub fn drivers(&self) -> &Drivers {
        &self.inner.drivers
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// One transport round trip through the active driver, with the
    /// endpoint's response transform applied. Logout bodies are discarded,
    /// so they are never transformed.
    async fn request(&self, endpoint: EndpointName, data: Option<&Value>) -> Result<Value, SessionError> {
        let transport = self.inner.drivers.get::<Http>()?;
        let raw = transport.request(endpoint, data).await?;
        let descriptor = match endpoint {
            EndpointName::Logout => None,
            _ => self.inner.config.api_endpoints.get(endpoint),
        };
        match descriptor {
            Some(descriptor) => Ok(descriptor.transform_response.apply(raw)?),
            None => Ok(raw),
        }
    }

    async fn evaluate_redirects(&self) {
        if self.inner.wired.is_released() {
            self.inner.evaluator.evaluate().await;
        }
    }

    fn wire_navigation(&self) {
        if self.inner.wiring_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let navigator = Arc::clone(&self.inner.navigator);
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            navigator.is_ready().await;
            let Some(inner) = weak.upgrade() else {
                tracing::debug!("session dropped before navigation was ready");
                return;
            };

            navigator.install_guard(Arc::new(RouteGuard::new(Arc::clone(&inner.config), inner.store.subscribe())));
            let handle = inner.evaluator.clone().spawn();
            if let Some(previous) = inner.subscription().replace(handle) {
                previous.abort();
            }
            inner.wired.release();
            tracing::debug!("route guard installed");

            inner.evaluator.evaluate().await;
        });
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
