//! In-memory navigator for headless hosts and tests.
//!
//! DESIGN
//! ======
//! A static route table (nested records with `:param` segments) resolved
//! against paths or route names. Every navigation runs the installed guard
//! chain before it commits; a guard redirect restarts resolution with the
//! new target, bounded by `MAX_REDIRECTS`. The navigator reports ready
//! after `start` commits the initial location.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::watch;
use url::form_urlencoded;

use super::{GuardDecision, Location, MatchedRoute, NavigationGuard, Navigator, RouteMeta, RouteTarget};
use crate::error::NavigationError;

/// Guard redirects followed before a navigation is declared a loop.
pub const MAX_REDIRECTS: usize = 10;

// =============================================================================
// ROUTE TABLE
// =============================================================================

/// Declarative route record. Child paths without a leading `/` nest under
/// the parent path.
#[derive(Debug, Clone, Default)]
pub struct RouteDef {
    pub path: String,
    pub name: Option<String>,
    pub meta: RouteMeta,
    pub children: Vec<RouteDef>,
}

impl RouteDef {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Self::default() }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn child(mut self, child: RouteDef) -> Self {
        self.children.push(child);
        self
    }
}

// =============================================================================
// NAVIGATOR
// =============================================================================

struct NavState {
    current: Location,
    history: Vec<String>,
    guards: Vec<Arc<dyn NavigationGuard>>,
}

/// Router living entirely in memory.
pub struct MemoryNavigator {
    routes: Vec<RouteDef>,
    state: Mutex<NavState>,
    ready: watch::Sender<bool>,
}

impl MemoryNavigator {
    #[must_use]
    pub fn new(routes: Vec<RouteDef>) -> Self {
        let (ready, _) = watch::channel(false);
        let start = Location { path: "/".into(), full_path: "/".into(), ..Location::default() };
        Self { routes, state: Mutex::new(NavState { current: start, history: Vec::new(), guards: Vec::new() }), ready }
    }

    /// Perform the initial navigation and mark the navigator ready.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` matches no route or guards loop; the
    /// navigator then stays not-ready.
    pub fn start(&self, path: &str) -> Result<Location, NavigationError> {
        let location = self.navigate(RouteTarget::path(path))?;
        self.ready.send_replace(true);
        tracing::debug!(path = %location.full_path, "navigator ready");
        Ok(location)
    }

    /// Committed full paths, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    #[must_use]
    pub fn guard_count(&self) -> usize {
        self.lock().guards.len()
    }

    /// Resolve a target against the route table without navigating.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError::NoMatch`] for unknown names or paths and
    /// for named targets missing a path parameter.
    pub fn resolve(&self, target: &RouteTarget) -> Result<Location, NavigationError> {
        let (raw_path, mut query) = match (&target.name, &target.path) {
            (Some(name), _) => (self.path_for_name(name, &target.params)?, BTreeMap::new()),
            (None, Some(path)) => split_query(path),
            (None, None) => return Err(NavigationError::NoMatch("empty target".into())),
        };
        query.extend(target.query.clone());

        let path = normalize(&raw_path);
        let segments = split_segments(&path);
        let (matched, path_params) =
            match_chain(&self.routes, "/", &segments).ok_or_else(|| NavigationError::NoMatch(path.clone()))?;

        let mut params = target.params.clone();
        params.extend(path_params);
        let name = matched.last().and_then(|record| record.name.clone());

        Ok(Location { full_path: full_path(&path, &query), path, name, params, query, matched })
    }

    fn navigate(&self, target: RouteTarget) -> Result<Location, NavigationError> {
        let requested = describe(&target);
        let mut target = target;

        for _ in 0..=MAX_REDIRECTS {
            let to = self.resolve(&target)?;
            let (from, guards) = {
                let state = self.lock();
                (state.current.clone(), state.guards.clone())
            };

            match run_guards(&guards, &to, &from) {
                GuardDecision::Allow => {
                    let mut state = self.lock();
                    if state.current.full_path != to.full_path || state.history.is_empty() {
                        state.history.push(to.full_path.clone());
                    }
                    state.current = to.clone();
                    return Ok(to);
                }
                GuardDecision::Redirect(next) => {
                    tracing::debug!(blocked = %to.full_path, redirect = %describe(&next), "navigation redirected");
                    target = next;
                }
            }
        }

        Err(NavigationError::RedirectLoop { path: requested, hops: MAX_REDIRECTS })
    }

    fn path_for_name(&self, name: &str, params: &BTreeMap<String, String>) -> Result<String, NavigationError> {
        let pattern =
            find_named(&self.routes, "/", name).ok_or_else(|| NavigationError::NoMatch(format!("route named {name}")))?;

        let mut segments = Vec::new();
        for segment in split_segments(&pattern) {
            match segment.strip_prefix(':') {
                Some(key) => {
                    let value = params
                        .get(key)
                        .ok_or_else(|| NavigationError::NoMatch(format!("route {name} missing param {key}")))?;
                    segments.push(value.clone());
                }
                None => segments.push(segment.to_owned()),
            }
        }
        Ok(format!("/{}", segments.join("/")))
    }

    fn lock(&self) -> MutexGuard<'_, NavState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Navigator for MemoryNavigator {
    fn install_guard(&self, guard: Arc<dyn NavigationGuard>) {
        self.lock().guards.push(guard);
    }

    fn current_location(&self) -> Location {
        self.lock().current.clone()
    }

    async fn is_ready(&self) {
        let mut ready = self.ready.subscribe();
        if ready.wait_for(|ready| *ready).await.is_err() {
            tracing::warn!("navigator dropped before becoming ready");
        }
    }

    async fn push(&self, target: RouteTarget) -> Result<Location, NavigationError> {
        self.navigate(target)
    }
}

// =============================================================================
// MATCHING
// =============================================================================

fn run_guards(guards: &[Arc<dyn NavigationGuard>], to: &Location, from: &Location) -> GuardDecision {
    for guard in guards {
        if let GuardDecision::Redirect(target) = guard.check(to, from) {
            return GuardDecision::Redirect(target);
        }
    }
    GuardDecision::Allow
}

fn match_chain(
    routes: &[RouteDef],
    parent: &str,
    segments: &[&str],
) -> Option<(Vec<MatchedRoute>, BTreeMap<String, String>)> {
    for route in routes {
        let pattern = join(parent, &route.path);
        let pattern_segments = split_segments(&pattern);
        let Some(mut params) = match_prefix(&pattern_segments, segments) else {
            continue;
        };
        let record = MatchedRoute { path: pattern.clone(), name: route.name.clone(), meta: route.meta.clone() };

        if let Some((mut chain, child_params)) = match_chain(&route.children, &pattern, segments) {
            chain.insert(0, record);
            params.extend(child_params);
            return Some((chain, params));
        }
        if pattern_segments.len() == segments.len() {
            return Some((vec![record], params));
        }
    }
    None
}

fn match_prefix(pattern: &[&str], segments: &[&str]) -> Option<BTreeMap<String, String>> {
    if pattern.len() > segments.len() {
        return None;
    }
    let mut params = BTreeMap::new();
    for (expected, actual) in pattern.iter().zip(segments) {
        match expected.strip_prefix(':') {
            Some(key) => {
                params.insert(key.to_owned(), (*actual).to_owned());
            }
            None if expected == actual => {}
            None => return None,
        }
    }
    Some(params)
}

fn find_named(routes: &[RouteDef], parent: &str, name: &str) -> Option<String> {
    routes.iter().find_map(|route| {
        let pattern = join(parent, &route.path);
        if route.name.as_deref() == Some(name) {
            return Some(pattern);
        }
        find_named(&route.children, &pattern, name)
    })
}

fn join(parent: &str, child: &str) -> String {
    if child.starts_with('/') {
        normalize(child)
    } else {
        normalize(&format!("{parent}/{child}"))
    }
}

fn normalize(path: &str) -> String {
    format!("/{}", split_segments(path).join("/"))
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

fn split_query(path: &str) -> (String, BTreeMap<String, String>) {
    let Some((path, raw_query)) = path.split_once('?') else {
        return (path.to_owned(), BTreeMap::new());
    };
    let query = form_urlencoded::parse(raw_query.as_bytes()).into_owned().collect();
    (path.to_owned(), query)
}

fn full_path(path: &str, query: &BTreeMap<String, String>) -> String {
    if query.is_empty() {
        return path.to_owned();
    }
    let encoded = form_urlencoded::Serializer::new(String::new()).extend_pairs(query).finish();
    format!("{path}?{encoded}")
}

fn describe(target: &RouteTarget) -> String {
    match (&target.name, &target.path) {
        (Some(name), _) => format!("route {name}"),
        (None, Some(path)) => path.clone(),
        (None, None) => "<empty>".into(),
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
