//! Navigation contract consumed by the session core.
//!
//! SYSTEM CONTEXT
//! ==============
//! The router is an external collaborator. The core needs four things from
//! it: the current location with its matched route chain, a hook to veto or
//! redirect proposed navigations, a readiness signal, and a way to push a
//! new target. [`Navigator`] is that contract; [`memory::MemoryNavigator`]
//! implements it without a browser.

pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RouteTargetOverrides;
use crate::error::NavigationError;

/// Free-form metadata attached to a route record.
pub type RouteMeta = serde_json::Map<String, Value>;

// =============================================================================
// TARGETS AND LOCATIONS
// =============================================================================

/// A navigation request: by route name or by path, plus params and query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
}

impl RouteTarget {
    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        Self { path: Some(path.into()), ..Self::default() }
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub(crate) fn merge(&mut self, overrides: RouteTargetOverrides) {
        if let Some(name) = overrides.name {
            self.name = Some(name);
        }
        if let Some(path) = overrides.path {
            self.path = Some(path);
        }
        if let Some(params) = overrides.params {
            self.params.extend(params);
        }
        if let Some(query) = overrides.query {
            self.query.extend(query);
        }
    }
}

/// One record of the matched route chain, outermost first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchedRoute {
    /// Full path pattern, e.g. `/boards/:id`.
    pub path: String,
    pub name: Option<String>,
    pub meta: RouteMeta,
}

/// A resolved location: where the user is, or where they are trying to go.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    pub path: String,
    /// Path plus query string; this is what `nextUrl` carries.
    pub full_path: String,
    pub name: Option<String>,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub matched: Vec<MatchedRoute>,
}

impl Location {
    /// Metadata values stored under `key` along the matched chain.
    pub fn meta_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.matched.iter().filter_map(move |record| record.meta.get(key))
    }
}

// =============================================================================
// GUARDS
// =============================================================================

/// Outcome of a guard check on a proposed navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(RouteTarget),
}

/// Intercepts proposed navigations before they commit.
pub trait NavigationGuard: Send + Sync {
    fn check(&self, to: &Location, from: &Location) -> GuardDecision;
}

// =============================================================================
// NAVIGATOR
// =============================================================================

/// Minimal router surface the session core depends on.
#[async_trait::async_trait]
pub trait Navigator: Send + Sync {
    /// Register a guard run before every navigation commits.
    fn install_guard(&self, guard: Arc<dyn NavigationGuard>);

    /// The committed current location.
    fn current_location(&self) -> Location;

    /// Resolves once the router has finished its initial navigation.
    async fn is_ready(&self);

    /// Navigate to `target`, running installed guards first.
    async fn push(&self, target: RouteTarget) -> Result<Location, NavigationError>;
}
