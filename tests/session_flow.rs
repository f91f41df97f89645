//! End-to-end session flow: real reqwest transport against an in-process
//! axum auth server, with the in-memory navigator enforcing route policy.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use authgate::navigation::memory::{MemoryNavigator, RouteDef};
use authgate::{
    ConfigOverrides, EndpointName, ErrorCode, Navigator, ResponseTransform, RouteTarget, SessionController,
    SessionError, SessionState, TransportError,
};
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};

// =============================================================================
// Fake auth server
// =============================================================================

#[derive(Clone, Default)]
struct AuthServer {
    sessions: Arc<Mutex<HashSet<String>>>,
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_owned())
}

async fn csrf_cookie() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, "XSRF-TOKEN=t0k3n; Path=/")])
}

async fn login(State(server): State<AuthServer>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if cookie(&headers, "XSRF-TOKEN").is_none() {
        return (StatusCode::from_u16(419).unwrap(), "csrf token mismatch").into_response();
    }
    if body["password"] != "hunter2" {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "message": "These credentials do not match." })))
            .into_response();
    }
    let token = format!("sess-{}", body["email"].as_str().unwrap_or("anon"));
    server.sessions.lock().unwrap().insert(token.clone());
    (
        [(header::SET_COOKIE, format!("session={token}; Path=/; HttpOnly"))],
        Json(json!({ "user": { "email": body["email"], "name": "Alice" } })),
    )
        .into_response()
}

async fn current_user(State(server): State<AuthServer>, headers: HeaderMap) -> Response {
    match cookie(&headers, "session") {
        Some(token) if server.sessions.lock().unwrap().contains(&token) => {
            Json(json!({ "email": token.trim_start_matches("sess-"), "name": "Alice" })).into_response()
        }
        _ => (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Unauthenticated." }))).into_response(),
    }
}

async fn logout(State(server): State<AuthServer>, headers: HeaderMap) -> StatusCode {
    match cookie(&headers, "session") {
        Some(token) if server.sessions.lock().unwrap().remove(&token) => StatusCode::NO_CONTENT,
        _ => StatusCode::UNAUTHORIZED,
    }
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/sanctum/csrf-cookie", get(csrf_cookie))
        .route("/api/auth/login", post(login))
        .route("/api/auth/user", get(current_user))
        .route("/api/auth/logout", post(logout))
        .with_state(AuthServer::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// =============================================================================
// Fixtures
// =============================================================================

fn routes() -> Vec<RouteDef> {
    vec![
        RouteDef::new("/").name("home"),
        RouteDef::new("/login").name("login").meta("auth", false),
        RouteDef::new("/account")
            .meta("auth", true)
            .child(RouteDef::new("").name("account"))
            .child(RouteDef::new("security").name("account.security")),
    ]
}

fn controller_for(base_url: &str, navigator: &Arc<MemoryNavigator>) -> SessionController {
    let overrides = ConfigOverrides::default()
        .http_options(json!({ "base_url": base_url, "timeout_secs": 5 }))
        .csrf_cookie("/sanctum/csrf-cookie")
        .transform(EndpointName::AttemptLogin, ResponseTransform::pointer("/user"));
    SessionController::builder()
        .overrides(overrides)
        .navigator(Arc::clone(navigator) as Arc<dyn Navigator>)
        .build()
        .unwrap()
}

async fn wait_for_path(navigator: &MemoryNavigator, path: &str) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while navigator.current_location().path != path {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never reached {path}; at {}", navigator.current_location().full_path));
}

// =============================================================================
// Flows
// =============================================================================

#[tokio::test]
async fn full_login_logout_cycle() {
    let base = spawn_server().await;
    let navigator = Arc::new(MemoryNavigator::new(routes()));
    navigator.start("/account/security").unwrap();
    let session = controller_for(&base, &navigator);

    // Fresh visitor: no session, bounced to login with the attempted path.
    session.initialize().await.unwrap();
    assert_eq!(session.snapshot(), SessionState { ready: true, authenticated: false, user: None });
    wait_for_path(&navigator, "/login").await;
    assert_eq!(
        navigator.current_location().params.get("nextUrl").map(String::as_str),
        Some("/account/security")
    );

    // Wrong password surfaces the server's rejection.
    let err = session
        .attempt_login(json!({ "email": "alice@example.com", "password": "wrong" }))
        .await
        .unwrap_err();
    assert!(matches!(err.transport(), Some(TransportError::Status { status: 422, .. })));
    assert!(!session.check());

    // Correct password authenticates and leaves the login page.
    let user = session
        .attempt_login(json!({ "email": "alice@example.com", "password": "hunter2" }))
        .await
        .unwrap();
    assert_eq!(user["email"], "alice@example.com");
    assert_eq!(session.user(), Some(user));
    wait_for_path(&navigator, "/").await;

    // Protected pages are reachable now; the refresh rides the session cookie.
    let landed = navigator.push(RouteTarget::named("account")).await.unwrap();
    assert_eq!(landed.path, "/account");
    let refreshed = session.fetch_user().await.unwrap();
    assert_eq!(refreshed["name"], "Alice");
    assert!(session.check());

    // Logout ends the session server-side and relocates the user.
    session.logout().await.unwrap();
    assert!(!session.check());
    wait_for_path(&navigator, "/login").await;

    // A second logout is rejected and changes nothing.
    let err = session.logout().await.unwrap_err();
    assert!(err.transport().is_some_and(TransportError::is_unauthorized));
    assert!(session.ready());
}

#[tokio::test]
async fn returning_visitor_is_restored_on_initialize() {
    let base = spawn_server().await;
    let navigator = Arc::new(MemoryNavigator::new(routes()));
    navigator.start("/login").unwrap();
    let session = controller_for(&base, &navigator);
    session.initialize().await.unwrap();
    session
        .attempt_login(json!({ "email": "bob@example.com", "password": "hunter2" }))
        .await
        .unwrap();

    // Same transport instance (and cookie jar), fresh initialize.
    session.initialize().await.unwrap();
    assert!(session.check());
    assert_eq!(session.user().unwrap()["email"], "bob@example.com");
}

#[tokio::test]
async fn unreachable_server_fails_csrf_priming() {
    let navigator = Arc::new(MemoryNavigator::new(routes()));
    navigator.start("/").unwrap();
    let session = controller_for("http://127.0.0.1:1", &navigator);

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, SessionError::CsrfBootstrap(TransportError::Request(_))));
    assert!(err.retryable());
    assert!(!session.ready());
}
