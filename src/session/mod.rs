//! Session core: observable state, the controller, and route policy.

pub mod controller;
pub mod guard;
pub mod state;

pub use controller::{SessionAction, SessionController, SessionControllerBuilder, SessionOutcome};
pub use guard::{RedirectEvaluator, RouteClass, RouteGuard};
pub use state::SessionState;
