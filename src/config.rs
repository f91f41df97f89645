//! Session configuration: built-in defaults plus caller overrides.
//!
//! DESIGN
//! ======
//! `Config` is always fully populated. Callers describe only what differs
//! through `ConfigOverrides`, a tree of optional fields mirroring `Config`.
//! `Config::resolve` walks both trees: nested records merge field by field,
//! everything else in an override (lists, transforms, scalars) replaces the
//! default outright. The two free-form JSON trees, transport options and
//! route-meta sentinels, follow the same rule through [`deep_merge`].
//!
//! Overrides can come from code, from a JSON document, or from
//! `AUTHGATE_*` environment variables.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::TransportError;
use crate::navigation::RouteTarget;

pub const DEFAULT_HTTP_DRIVER: &str = "reqwest";
pub const DEFAULT_MODULE_NAME: &str = "auth";
pub const DEFAULT_AUTH_META_KEY: &str = "auth";
pub const DEFAULT_CSRF_COOKIE_URL: &str = "/sanctum/csrf-cookie";
pub const DEFAULT_FETCH_USER_URL: &str = "/api/auth/user";
pub const DEFAULT_LOGIN_URL: &str = "/api/auth/login";
pub const DEFAULT_LOGOUT_URL: &str = "/api/auth/logout";
pub const DEFAULT_LOGIN_REDIRECT: &str = "/login";
pub const DEFAULT_HOME_REDIRECT: &str = "/";

/// Route parameter carrying the originally requested path to the login view.
pub const NEXT_URL_PARAM: &str = "nextUrl";

// =============================================================================
// ENDPOINTS
// =============================================================================

/// HTTP method of an API endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// The four operations a transport must support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EndpointName {
    SetCsrfCookie,
    FetchUser,
    AttemptLogin,
    Logout,
}

impl EndpointName {
    pub const ALL: [Self; 4] = [Self::SetCsrfCookie, Self::FetchUser, Self::AttemptLogin, Self::Logout];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SetCsrfCookie => "setCsrfCookie",
            Self::FetchUser => "fetchUser",
            Self::AttemptLogin => "attemptLogin",
            Self::Logout => "logout",
        }
    }
}

impl fmt::Display for EndpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type TransformFn = dyn Fn(Value) -> Result<Value, String> + Send + Sync;

/// Maps a raw response body to the user record stored in the session.
#[derive(Clone)]
pub struct ResponseTransform(Arc<TransformFn>);

impl ResponseTransform {
    #[must_use]
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self(Arc::new(transform))
    }

    /// Pass the response through unchanged.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(Ok)
    }

    /// Select a nested value by JSON pointer, e.g. `/data/user`.
    #[must_use]
    pub fn pointer(pointer: impl Into<String>) -> Self {
        let pointer = pointer.into();
        Self::new(move |raw| {
            raw.pointer(&pointer)
                .cloned()
                .ok_or_else(|| format!("response has no value at {pointer}"))
        })
    }

    /// Apply the transform, mapping a rejection to [`TransportError::Transform`].
    ///
    /// # Errors
    ///
    /// Returns the transform's rejection message wrapped as a transport error.
    pub fn apply(&self, raw: Value) -> Result<Value, TransportError> {
        (self.0)(raw).map_err(TransportError::Transform)
    }
}

impl Default for ResponseTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for ResponseTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseTransform(..)")
    }
}

/// Method, URL, and response transform of one API operation.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: Method,
    pub url: String,
    pub transform_response: ResponseTransform,
}

impl Endpoint {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), transform_response: ResponseTransform::identity() }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: ResponseTransform) -> Self {
        self.transform_response = transform;
        self
    }

    fn merge(&mut self, overrides: EndpointOverrides) {
        if let Some(method) = overrides.method {
            self.method = method;
        }
        if let Some(url) = overrides.url {
            self.url = url;
        }
        if let Some(transform) = overrides.transform_response {
            self.transform_response = transform;
        }
    }
}

/// The API surface used by the session controller.
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    /// CSRF priming request run before `initialize`; `None` disables it.
    pub set_csrf_cookie: Option<Endpoint>,
    pub fetch_user: Endpoint,
    pub attempt_login: Endpoint,
    pub logout: Endpoint,
}

impl ApiEndpoints {
    #[must_use]
    pub fn get(&self, name: EndpointName) -> Option<&Endpoint> {
        match name {
            EndpointName::SetCsrfCookie => self.set_csrf_cookie.as_ref(),
            EndpointName::FetchUser => Some(&self.fetch_user),
            EndpointName::AttemptLogin => Some(&self.attempt_login),
            EndpointName::Logout => Some(&self.logout),
        }
    }
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            set_csrf_cookie: None,
            fetch_user: Endpoint::new(Method::Get, DEFAULT_FETCH_USER_URL),
            attempt_login: Endpoint::new(Method::Post, DEFAULT_LOGIN_URL),
            logout: Endpoint::new(Method::Post, DEFAULT_LOGOUT_URL),
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Namespacing for operation names (`auth/attemptLogin`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub namespaced: bool,
    pub module_name: String,
}

/// Active transport name plus its driver-specific options.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub driver: String,
    pub config: Value,
}

/// Route metadata convention: the key to inspect and the two sentinel values.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthMeta {
    pub key: String,
    pub authenticated: Value,
    pub unauthenticated: Value,
}

/// Where the guard sends users it turns away.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirects {
    /// Target for anonymous users hitting a protected route.
    pub unauthenticated: RouteTarget,
    /// Target for authenticated users hitting an anonymous-only route.
    pub authenticated: RouteTarget,
}

/// Fully resolved session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub http: HttpConfig,
    pub auth_meta: AuthMeta,
    pub redirects: Redirects,
    pub api_endpoints: ApiEndpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig { namespaced: true, module_name: DEFAULT_MODULE_NAME.to_owned() },
            http: HttpConfig { driver: DEFAULT_HTTP_DRIVER.to_owned(), config: Value::Object(serde_json::Map::new()) },
            auth_meta: AuthMeta {
                key: DEFAULT_AUTH_META_KEY.to_owned(),
                authenticated: Value::Bool(true),
                unauthenticated: Value::Bool(false),
            },
            redirects: Redirects {
                unauthenticated: RouteTarget::path(DEFAULT_LOGIN_REDIRECT),
                authenticated: RouteTarget::path(DEFAULT_HOME_REDIRECT),
            },
            api_endpoints: ApiEndpoints::default(),
        }
    }
}

impl Config {
    /// Merge `overrides` onto the built-in defaults.
    #[must_use]
    pub fn resolve(overrides: ConfigOverrides) -> Self {
        let mut config = Self::default();
        config.merge(overrides);
        config
    }

    /// Resolve overrides taken from `AUTHGATE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::resolve(ConfigOverrides::from_env())
    }

    /// Qualify an operation name with the module name when namespaced.
    ///
    /// `None` yields the namespace itself (empty when not namespaced).
    #[must_use]
    pub fn store_prefix(&self, name: Option<&str>) -> String {
        match (name, self.store.namespaced) {
            (None, true) => self.store.module_name.clone(),
            (None, false) => String::new(),
            (Some(name), true) => format!("{}/{name}", self.store.module_name),
            (Some(name), false) => name.to_owned(),
        }
    }

    fn merge(&mut self, overrides: ConfigOverrides) {
        if let Some(store) = overrides.store {
            if let Some(namespaced) = store.namespaced {
                self.store.namespaced = namespaced;
            }
            if let Some(module_name) = store.module_name {
                self.store.module_name = module_name;
            }
        }

        if let Some(http) = overrides.http {
            if let Some(driver) = http.driver {
                self.http.driver = driver;
            }
            if let Some(options) = http.config {
                self.http.config = deep_merge(std::mem::take(&mut self.http.config), options);
            }
        }

        if let Some(meta) = overrides.auth_meta {
            if let Some(key) = meta.key {
                self.auth_meta.key = key;
            }
            if let Some(value) = meta.authenticated {
                self.auth_meta.authenticated = deep_merge(std::mem::take(&mut self.auth_meta.authenticated), value);
            }
            if let Some(value) = meta.unauthenticated {
                self.auth_meta.unauthenticated =
                    deep_merge(std::mem::take(&mut self.auth_meta.unauthenticated), value);
            }
        }

        if let Some(redirects) = overrides.redirects {
            if let Some(target) = redirects.unauthenticated {
                self.redirects.unauthenticated.merge(target);
            }
            if let Some(target) = redirects.authenticated {
                self.redirects.authenticated.merge(target);
            }
        }

        if let Some(endpoints) = overrides.api_endpoints {
            self.merge_endpoints(endpoints);
        }
    }

    fn merge_endpoints(&mut self, overrides: ApiEndpointsOverrides) {
        let api = &mut self.api_endpoints;
        match overrides.set_csrf_cookie {
            None => {}
            Some(None) => api.set_csrf_cookie = None,
            Some(Some(csrf)) => match api.set_csrf_cookie.as_mut() {
                Some(endpoint) => endpoint.merge(csrf),
                None => {
                    let mut endpoint = Endpoint::new(Method::Get, DEFAULT_CSRF_COOKIE_URL);
                    endpoint.merge(csrf);
                    api.set_csrf_cookie = Some(endpoint);
                }
            },
        }
        if let Some(fetch_user) = overrides.fetch_user {
            api.fetch_user.merge(fetch_user);
        }
        if let Some(attempt_login) = overrides.attempt_login {
            api.attempt_login.merge(attempt_login);
        }
        if let Some(logout) = overrides.logout {
            api.logout.merge(logout);
        }
    }
}

// =============================================================================
// OVERRIDES
// =============================================================================

/// Partial configuration; every `None` inherits the default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigOverrides {
    pub store: Option<StoreOverrides>,
    pub http: Option<HttpOverrides>,
    pub auth_meta: Option<AuthMetaOverrides>,
    pub redirects: Option<RedirectOverrides>,
    pub api_endpoints: Option<ApiEndpointsOverrides>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreOverrides {
    pub namespaced: Option<bool>,
    pub module_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpOverrides {
    pub driver: Option<String>,
    pub config: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthMetaOverrides {
    pub key: Option<String>,
    pub authenticated: Option<Value>,
    pub unauthenticated: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedirectOverrides {
    pub unauthenticated: Option<RouteTargetOverrides>,
    pub authenticated: Option<RouteTargetOverrides>,
}

/// Partial redirect target. Param and query maps merge key by key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RouteTargetOverrides {
    pub name: Option<String>,
    pub path: Option<String>,
    pub params: Option<BTreeMap<String, String>>,
    pub query: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiEndpointsOverrides {
    /// Outer `None` inherits; `Some(None)` (JSON `null`) disables priming.
    #[serde(deserialize_with = "explicit_null")]
    pub set_csrf_cookie: Option<Option<EndpointOverrides>>,
    pub fetch_user: Option<EndpointOverrides>,
    pub attempt_login: Option<EndpointOverrides>,
    pub logout: Option<EndpointOverrides>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EndpointOverrides {
    pub method: Option<Method>,
    pub url: Option<String>,
    /// Transforms are code, never part of a JSON document.
    #[serde(skip)]
    pub transform_response: Option<ResponseTransform>,
}

/// Keep a present-but-null field distinct from an absent one.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ConfigOverrides {
    /// Parse overrides from a JSON document (camelCase keys).
    ///
    /// # Errors
    ///
    /// Returns the parse error if the document does not match the override shape.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Build overrides from environment variables.
    ///
    /// All optional; unset or blank variables contribute nothing:
    /// - `AUTHGATE_HTTP_DRIVER`: active transport name
    /// - `AUTHGATE_BASE_URL`: `http.config.base_url`
    /// - `AUTHGATE_CSRF_COOKIE_URL`: enables CSRF priming against this URL
    /// - `AUTHGATE_LOGIN_REDIRECT`: path for anonymous users on protected routes
    /// - `AUTHGATE_HOME_REDIRECT`: path for authenticated users on anonymous-only routes
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| match std::env::var(key) {
            Ok(value) => Some(value),
            Err(_) => None,
        })
    }

    /// Same mapping as [`ConfigOverrides::from_env`], reading variables
    /// through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env_string = |key: &str| non_blank(lookup(key));
        let mut overrides = Self::default();

        let driver = env_string("AUTHGATE_HTTP_DRIVER");
        let base_url = env_string("AUTHGATE_BASE_URL");
        if driver.is_some() || base_url.is_some() {
            overrides.http = Some(HttpOverrides {
                driver,
                config: base_url.map(|url| serde_json::json!({ "base_url": url })),
            });
        }

        if let Some(url) = env_string("AUTHGATE_CSRF_COOKIE_URL") {
            overrides = overrides.csrf_cookie(url);
        }

        let login = env_string("AUTHGATE_LOGIN_REDIRECT");
        let home = env_string("AUTHGATE_HOME_REDIRECT");
        if login.is_some() || home.is_some() {
            overrides.redirects = Some(RedirectOverrides {
                unauthenticated: login.map(|path| RouteTargetOverrides { path: Some(path), ..Default::default() }),
                authenticated: home.map(|path| RouteTargetOverrides { path: Some(path), ..Default::default() }),
            });
        }

        overrides
    }

    /// Select the active transport by name.
    #[must_use]
    pub fn http_driver(mut self, name: impl Into<String>) -> Self {
        self.http.get_or_insert_with(HttpOverrides::default).driver = Some(name.into());
        self
    }

    /// Deep-merge transport options onto any already set.
    #[must_use]
    pub fn http_options(mut self, options: Value) -> Self {
        let http = self.http.get_or_insert_with(HttpOverrides::default);
        http.config = Some(match http.config.take() {
            Some(existing) => deep_merge(existing, options),
            None => options,
        });
        self
    }

    /// Enable CSRF priming with a `GET` to `url`.
    #[must_use]
    pub fn csrf_cookie(mut self, url: impl Into<String>) -> Self {
        self.api_endpoints_mut().set_csrf_cookie =
            Some(Some(EndpointOverrides { method: Some(Method::Get), url: Some(url.into()), transform_response: None }));
        self
    }

    /// Explicitly disable CSRF priming.
    #[must_use]
    pub fn without_csrf_cookie(mut self) -> Self {
        self.api_endpoints_mut().set_csrf_cookie = Some(None);
        self
    }

    /// Attach a response transform to `endpoint`. CSRF priming has no transform.
    #[must_use]
    pub fn transform(mut self, endpoint: EndpointName, transform: ResponseTransform) -> Self {
        let api = self.api_endpoints_mut();
        let slot = match endpoint {
            EndpointName::SetCsrfCookie => None,
            EndpointName::FetchUser => Some(&mut api.fetch_user),
            EndpointName::AttemptLogin => Some(&mut api.attempt_login),
            EndpointName::Logout => Some(&mut api.logout),
        };
        if let Some(slot) = slot {
            slot.get_or_insert_with(EndpointOverrides::default).transform_response = Some(transform);
        }
        self
    }

    fn api_endpoints_mut(&mut self) -> &mut ApiEndpointsOverrides {
        self.api_endpoints.get_or_insert_with(ApiEndpointsOverrides::default)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

// =============================================================================
// DEEP MERGE
// =============================================================================

/// Merge `overlay` onto `base`. Objects merge recursively; any other overlay
/// value (arrays, scalars, `null`) replaces the base value wholesale.
#[must_use]
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
