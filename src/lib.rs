//! authgate — client-side authentication session manager.
//!
//! SYSTEM CONTEXT
//! ==============
//! Tracks whether the current user is authenticated, runs the login /
//! logout / fetch-user round trips through a pluggable transport, and keeps
//! navigation consistent with the session: protected routes bounce
//! anonymous users to the login target, anonymous-only routes bounce
//! authenticated users home.
//!
//! ```text
//! Config ──► Drivers (transport) ──► SessionController ──► SessionState
//!                                          │                    │
//!                                          ▼                    ▼
//!                                   RedirectEvaluator ◄──── RouteGuard ◄── Navigator
//! ```
//!
//! The navigator (router) is an external collaborator consumed through the
//! [`navigation::Navigator`] trait. [`navigation::memory::MemoryNavigator`]
//! is a self-contained implementation for headless use and tests.

pub mod config;
pub mod drivers;
pub mod error;
pub mod navigation;
pub mod session;

#[cfg(test)]
#[path = "test_helpers_test.rs"]
pub mod test_helpers;

pub use config::{Config, ConfigOverrides, EndpointName, ResponseTransform};
pub use drivers::http::{ReqwestTransport, Transport};
pub use drivers::{Capability, DriverKind, Drivers, Http};
pub use error::{DriverError, ErrorCode, NavigationError, SessionError, TransportError};
pub use navigation::{GuardDecision, Location, NavigationGuard, Navigator, RouteTarget};
pub use session::{RouteClass, SessionAction, SessionController, SessionControllerBuilder, SessionOutcome, SessionState};
