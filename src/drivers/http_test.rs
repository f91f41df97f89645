use super::*;
use crate::config::ConfigOverrides;
use axum::Router;
use axum::http::{HeaderMap as AxumHeaders, StatusCode, header};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use serde_json::json;

// =========================================================================
// Fake auth server
// =========================================================================

async fn current_user(headers: AxumHeaders) -> axum::response::Response {
    let has_session = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|cookies| cookies.contains("XSRF-TOKEN=abc"));
    if has_session {
        Json(json!({ "id": 1, "name": "alice" })).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "unauthenticated").into_response()
    }
}

async fn csrf_cookie() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, "XSRF-TOKEN=abc; Path=/")])
}

async fn login(Json(body): Json<serde_json::Value>) -> axum::response::Response {
    if body["password"] == "secret" {
        Json(json!({ "user": { "id": 1, "name": body["email"] } })).into_response()
    } else {
        (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "message": "bad credentials" }))).into_response()
    }
}

async fn echo_header(headers: AxumHeaders) -> Json<serde_json::Value> {
    let value = headers.get("x-client").and_then(|v| v.to_str().ok()).unwrap_or_default().to_owned();
    Json(json!({ "x-client": value }))
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/sanctum/csrf-cookie", get(csrf_cookie))
        .route("/api/auth/user", get(current_user))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(|| async { StatusCode::NO_CONTENT }))
        .route("/echo", get(echo_header));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn transport_for(base_url: &str, overrides: ConfigOverrides) -> ReqwestTransport {
    let config = Config::resolve(overrides.http_options(json!({ "base_url": base_url })));
    ReqwestTransport::new(&config).unwrap()
}

// =========================================================================
// parse_response
// =========================================================================

#[test]
fn parse_response_empty_body_is_null() {
    assert_eq!(parse_response(204, "").unwrap(), Value::Null);
    assert_eq!(parse_response(200, "  \n").unwrap(), Value::Null);
}

#[test]
fn parse_response_json_body() {
    assert_eq!(parse_response(200, r#"{"id":1}"#).unwrap(), json!({ "id": 1 }));
}

#[test]
fn parse_response_non_success_keeps_status_and_body() {
    let err = parse_response(401, "nope").unwrap_err();
    assert_eq!(err, TransportError::Status { status: 401, body: "nope".into() });
}

#[test]
fn parse_response_invalid_json_is_decode_error() {
    assert!(matches!(parse_response(200, "{not json"), Err(TransportError::Decode(_))));
}

// =========================================================================
// endpoint_url / options
// =========================================================================

#[test]
fn endpoint_url_joins_relative_paths() {
    assert_eq!(endpoint_url(Some("http://api.test"), "/api/auth/user"), "http://api.test/api/auth/user");
    assert_eq!(endpoint_url(Some("http://api.test"), "api/auth/user"), "http://api.test/api/auth/user");
    assert_eq!(endpoint_url(None, "/api/auth/user"), "/api/auth/user");
}

#[test]
fn endpoint_url_absolute_passes_through() {
    assert_eq!(endpoint_url(Some("http://api.test"), "https://sso.test/me"), "https://sso.test/me");
}

#[test]
fn options_default_when_tree_empty() {
    let options = HttpOptions::from_config(&Config::default()).unwrap();
    assert_eq!(options, HttpOptions::default());
    assert!(options.cookies);
    assert_eq!(options.timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
}

#[test]
fn options_ignore_unknown_keys() {
    let config = Config::resolve(ConfigOverrides::default().http_options(json!({ "timeout_secs": 5, "retries": 3 })));
    let options = HttpOptions::from_config(&config).unwrap();
    assert_eq!(options.timeout_secs, 5);
}

#[test]
fn options_wrong_shape_is_build_error() {
    let config = Config::resolve(ConfigOverrides::default().http_options(json!({ "timeout_secs": "soon" })));
    let err = HttpOptions::from_config(&config).unwrap_err();
    assert!(matches!(err, DriverError::Build { kind: DriverKind::Http, .. }));
}

#[test]
fn invalid_header_name_fails_build() {
    let config = Config::resolve(ConfigOverrides::default().http_options(json!({ "headers": { "bad header": "x" } })));
    assert!(matches!(ReqwestTransport::new(&config), Err(DriverError::Build { .. })));
}

// =========================================================================
// round trips
// =========================================================================

#[tokio::test]
async fn fetch_user_without_cookie_is_unauthorized() {
    let base = spawn_server().await;
    let transport = transport_for(&base, ConfigOverrides::default());
    let err = transport.request(EndpointName::FetchUser, None).await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn csrf_priming_cookie_is_replayed() {
    let base = spawn_server().await;
    let transport = transport_for(&base, ConfigOverrides::default().csrf_cookie("/sanctum/csrf-cookie"));
    assert_eq!(transport.request(EndpointName::SetCsrfCookie, None).await.unwrap(), Value::Null);
    let user = transport.request(EndpointName::FetchUser, None).await.unwrap();
    assert_eq!(user["name"], "alice");
}

#[tokio::test]
async fn disabled_csrf_endpoint_is_rejected_locally() {
    let transport = transport_for("http://127.0.0.1:1", ConfigOverrides::default());
    let err = transport.request(EndpointName::SetCsrfCookie, None).await.unwrap_err();
    assert_eq!(err, TransportError::EndpointDisabled(EndpointName::SetCsrfCookie));
}

#[tokio::test]
async fn login_posts_json_body() {
    let base = spawn_server().await;
    let transport = transport_for(&base, ConfigOverrides::default());
    let ok = transport
        .request(EndpointName::AttemptLogin, Some(&json!({ "email": "a@b.c", "password": "secret" })))
        .await
        .unwrap();
    assert_eq!(ok["user"]["name"], "a@b.c");

    let err = transport
        .request(EndpointName::AttemptLogin, Some(&json!({ "email": "a@b.c", "password": "wrong" })))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Status { status: 422, ref body } if body.contains("bad credentials")));
}

#[tokio::test]
async fn logout_no_content_is_null() {
    let base = spawn_server().await;
    let transport = transport_for(&base, ConfigOverrides::default());
    assert_eq!(transport.request(EndpointName::Logout, None).await.unwrap(), Value::Null);
}

#[tokio::test]
async fn default_headers_are_sent() {
    let base = spawn_server().await;
    let mut overrides = ConfigOverrides::default().http_options(json!({ "headers": { "x-client": "authgate" } }));
    overrides.api_endpoints = Some(crate::config::ApiEndpointsOverrides {
        fetch_user: Some(crate::config::EndpointOverrides { url: Some("/echo".into()), ..Default::default() }),
        ..Default::default()
    });
    let transport = transport_for(&base, overrides);
    let echoed = transport.request(EndpointName::FetchUser, None).await.unwrap();
    assert_eq!(echoed["x-client"], "authgate");
}

#[tokio::test]
async fn connection_refused_is_retryable_request_error() {
    let transport = transport_for("http://127.0.0.1:1", ConfigOverrides::default());
    let err = transport.request(EndpointName::FetchUser, None).await.unwrap_err();
    assert!(matches!(err, TransportError::Request(_)));
    assert!(crate::error::ErrorCode::retryable(&err));
}

#[test]
fn factory_builds_shared_transport() {
    let transport = reqwest_factory(&Config::default());
    assert!(transport.is_ok());
}
