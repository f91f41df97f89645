//! Error taxonomy for session, transport, driver, and navigation failures.
//!
//! DESIGN
//! ======
//! Every error carries a stable machine-readable code through [`ErrorCode`]
//! so UI layers can branch on `E_*` strings instead of matching messages.
//! Transport failures are the only expected errors: during `initialize`
//! they mean "no session" and are absorbed; everywhere else they surface.

use crate::config::EndpointName;
use crate::drivers::DriverKind;

/// Stable error code and retry hint for surfaced errors.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Failure of a single transport round trip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("unexpected status {status}")]
    Status { status: u16, body: String },

    /// The response body was not valid JSON.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The endpoint is disabled in the active configuration.
    #[error("endpoint {0} is disabled")]
    EndpointDisabled(EndpointName),

    /// The configured response transform rejected the payload.
    #[error("response transform failed: {0}")]
    Transform(String),
}

impl TransportError {
    /// `true` for 401/419 answers, the usual "no session" replies.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 419, .. })
    }
}

impl ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_TRANSPORT_REQUEST",
            Self::Status { .. } => "E_TRANSPORT_STATUS",
            Self::Decode(_) => "E_TRANSPORT_DECODE",
            Self::EndpointDisabled(_) => "E_ENDPOINT_DISABLED",
            Self::Transform(_) => "E_RESPONSE_TRANSFORM",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// DRIVERS
// =============================================================================

/// Failure to resolve or construct a driver instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// No factory registered under the active name.
    #[error("no {kind} driver registered under \"{name}\"")]
    Unknown { kind: DriverKind, name: String },

    /// No name was ever selected for the capability.
    #[error("no active {kind} driver selected")]
    Unselected { kind: DriverKind },

    /// The factory rejected the configuration.
    #[error("failed to build {kind} driver \"{name}\": {reason}")]
    Build { kind: DriverKind, name: String, reason: String },
}

impl ErrorCode for DriverError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unknown { .. } | Self::Unselected { .. } => "E_UNKNOWN_DRIVER",
            Self::Build { .. } => "E_DRIVER_BUILD",
        }
    }
}

// =============================================================================
// NAVIGATION
// =============================================================================

/// Failure reported by a navigator while resolving or committing a move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    /// No route matches the requested target.
    #[error("no route matches {0}")]
    NoMatch(String),

    /// Guards kept redirecting past the hop limit.
    #[error("redirect loop while navigating to {path} ({hops} hops)")]
    RedirectLoop { path: String, hops: usize },
}

impl ErrorCode for NavigationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NoMatch(_) => "E_NAV_NO_MATCH",
            Self::RedirectLoop { .. } => "E_NAV_REDIRECT_LOOP",
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Errors surfaced by [`crate::SessionController`] operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),

    /// The controller was built without a required collaborator.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The CSRF priming request failed; this is infrastructure, not "logged out".
    #[error("csrf cookie bootstrap failed: {0}")]
    CsrfBootstrap(#[source] TransportError),
}

impl SessionError {
    /// The underlying transport failure, if this error came from a round trip.
    #[must_use]
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(e) | Self::CsrfBootstrap(e) => Some(e),
            _ => None,
        }
    }
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(e) => e.error_code(),
            Self::Driver(e) => e.error_code(),
            Self::Navigation(e) => e.error_code(),
            Self::Configuration(_) => "E_CONFIGURATION",
            Self::CsrfBootstrap(_) => "E_CSRF_BOOTSTRAP",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Transport(e) | Self::CsrfBootstrap(e) => e.retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
