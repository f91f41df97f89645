//! HTTP transport capability and its default `reqwest` driver.
//!
//! DESIGN
//! ======
//! The session core only ever calls `Transport::request(endpoint, data)`;
//! method and URL come from `Config.api_endpoints`. The reqwest driver reads
//! its options from the free-form `http.config` tree, keeps a cookie store
//! so CSRF priming and session cookies carry over between calls, and maps
//! every non-2xx answer to `TransportError::Status`. Response parsing is a
//! pure function for testability.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::Value;

use super::DriverKind;
use crate::config::{ApiEndpoints, Config, Endpoint, EndpointName, Method};
use crate::error::{DriverError, TransportError};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// TRANSPORT TRAIT
// =============================================================================

/// Uniform "make an authentication request" capability. Enables mocking in tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request configured for `endpoint`, sending `data` as the
    /// JSON body when present, and return the decoded response body.
    async fn request(&self, endpoint: EndpointName, data: Option<&Value>) -> Result<Value, TransportError>;
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Options read from `http.config`. Unknown keys are ignored so other
/// drivers can share the tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    /// Prefix for relative endpoint URLs.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Keep a cookie store across requests.
    pub cookies: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            headers: BTreeMap::new(),
            cookies: true,
        }
    }
}

impl HttpOptions {
    /// Parse options from the resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Build`] when `http.config` has the wrong shape.
    pub fn from_config(config: &Config) -> Result<Self, DriverError> {
        serde_json::from_value(config.http.config.clone()).map_err(|e| build_error(config, e.to_string()))
    }

    fn header_map(&self, config: &Config) -> Result<HeaderMap, DriverError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| build_error(config, format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| build_error(config, format!("invalid header value for {name}: {e}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

fn build_error(config: &Config, reason: String) -> DriverError {
    DriverError::Build { kind: DriverKind::Http, name: config.http.driver.clone(), reason }
}

// =============================================================================
// REQWEST DRIVER
// =============================================================================

pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: Option<String>,
    endpoints: ApiEndpoints,
}

impl ReqwestTransport {
    /// Build the driver from `http.config` and `api_endpoints`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Build`] for malformed options or if the HTTP
    /// client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self, DriverError> {
        let options = HttpOptions::from_config(config)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .connect_timeout(Duration::from_secs(options.connect_timeout_secs))
            .default_headers(options.header_map(config)?)
            .cookie_store(options.cookies)
            .build()
            .map_err(|e| build_error(config, e.to_string()))?;

        Ok(Self {
            http,
            base_url: options.base_url.map(|url| url.trim_end_matches('/').to_owned()),
            endpoints: config.api_endpoints.clone(),
        })
    }

    fn url_for(&self, endpoint: &Endpoint) -> String {
        endpoint_url(self.base_url.as_deref(), &endpoint.url)
    }
}

/// Factory registered under [`crate::config::DEFAULT_HTTP_DRIVER`].
///
/// # Errors
///
/// Propagates [`ReqwestTransport::new`] failures.
pub fn reqwest_factory(config: &Config) -> Result<Arc<dyn Transport>, DriverError> {
    Ok(Arc::new(ReqwestTransport::new(config)?))
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn request(&self, endpoint: EndpointName, data: Option<&Value>) -> Result<Value, TransportError> {
        let descriptor = self.endpoints.get(endpoint).ok_or(TransportError::EndpointDisabled(endpoint))?;
        let url = self.url_for(descriptor);

        let mut request = self.http.request(to_reqwest_method(descriptor.method), &url);
        if let Some(body) = data {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        tracing::debug!(%endpoint, %url, status, "auth request completed");
        parse_response(status, &text)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Absolute URLs pass through; relative ones are joined onto `base_url`.
fn endpoint_url(base_url: Option<&str>, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_owned();
    }
    match base_url {
        Some(base) => format!("{base}/{}", url.trim_start_matches('/')),
        None => url.to_owned(),
    }
}

/// Decode a response body. Empty bodies are `null`; non-2xx is an error.
fn parse_response(status: u16, body: &str) -> Result<Value, TransportError> {
    if !(200..300).contains(&status) {
        return Err(TransportError::Status { status, body: body.to_owned() });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
