//! Single-flight refresh tests against a loopback API server.
//!
//! The server counts refresh exchanges, so these tests can assert the
//! core guarantee directly: N concurrent session-expiry detections
//! produce exactly one refresh network call, and every caller converges
//! on its outcome.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};

use soledex_client::{ApiClient, ClientError, Session, SessionStore};

// ---------------------------------------------------------------------------
// Loopback server
// ---------------------------------------------------------------------------

struct ServerState {
    refresh_calls: AtomicUsize,
    valid_access: Mutex<String>,
    valid_refresh: Mutex<String>,
}

impl ServerState {
    fn new(valid_access: &str, valid_refresh: &str) -> Arc<Self> {
        Arc::new(Self {
            refresh_calls: AtomicUsize::new(0),
            valid_access: Mutex::new(valid_access.to_string()),
            valid_refresh: Mutex::new(valid_refresh.to_string()),
        })
    }

    fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

/// Protected resource: 401 unless the bearer token is the current one.
async fn widget(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    let expected = format!("Bearer {}", state.valid_access.lock().unwrap());
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if presented == expected {
        (StatusCode::OK, Json(serde_json::json!({ "data": "ok" })))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "token expired" })),
        )
    }
}

/// Refresh exchange: counts calls, rotates the pair on success.
async fn refresh(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    // Widen the single-flight window so concurrent callers pile up on
    // the gate while the exchange is in flight.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let presented = body["refreshToken"].as_str().unwrap_or_default();
    let expected = state.valid_refresh.lock().unwrap().clone();
    if presented != expected {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid refresh token" })),
        );
    }

    *state.valid_access.lock().unwrap() = "access-2".to_string();
    *state.valid_refresh.lock().unwrap() = "refresh-2".to_string();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "accessToken": "access-2",
            "refreshToken": "refresh-2",
        })),
    )
}

/// Login stays 401 so tests can prove auth routes never recurse.
async fn login() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "bad credentials" })),
    )
}

async fn serve(state: Arc<ServerState>) -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/api/widget", get(widget))
        .route("/auth/refresh", post(refresh))
        .route("/auth/login", post(login))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), handle)
}

fn stale_session() -> Session {
    Session {
        access_token: "stale-access".into(),
        refresh_token: "refresh-1".into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_expiries_trigger_exactly_one_refresh() {
    let server = ServerState::new("access-2", "refresh-1");
    let (base_url, handle) = serve(Arc::clone(&server)).await;

    let store = Arc::new(SessionStore::with_session(stale_session()));
    let client = ApiClient::new(base_url, Arc::clone(&store));

    // N concurrent calls that all observe session expiry.
    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                client.get_json::<serde_json::Value>("/api/widget").await
            })
        })
        .collect();

    for task in tasks {
        let result = task.await.expect("task should not panic");
        let body = result.expect("every caller should resolve after refresh");
        assert_eq!(body["data"], "ok");
    }

    // Exactly one refresh exchange for all five callers.
    assert_eq!(server.refresh_calls(), 1);

    // The store converged on the refreshed credential.
    let (session, _) = store.snapshot().await;
    assert_eq!(session.unwrap().access_token, "access-2");

    handle.abort();
}

#[tokio::test]
async fn failed_refresh_rejects_all_callers_and_clears_session() {
    // The server does not recognize the client's refresh token.
    let server = ServerState::new("access-2", "some-other-refresh");
    let (base_url, handle) = serve(Arc::clone(&server)).await;

    let store = Arc::new(SessionStore::with_session(stale_session()));
    let client = ApiClient::new(base_url, Arc::clone(&store));

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                client.get_json::<serde_json::Value>("/api/widget").await
            })
        })
        .collect();

    for task in tasks {
        let result = task.await.expect("task should not panic");
        assert_matches!(result, Err(ClientError::SessionExpired));
    }

    // One failed exchange, shared by every caller; session cleared.
    assert_eq!(server.refresh_calls(), 1);
    let (session, _) = store.snapshot().await;
    assert!(session.is_none());

    handle.abort();
}

#[tokio::test]
async fn valid_session_never_touches_the_refresh_endpoint() {
    let server = ServerState::new("good-access", "refresh-1");
    let (base_url, handle) = serve(Arc::clone(&server)).await;

    let store = Arc::new(SessionStore::with_session(Session {
        access_token: "good-access".into(),
        refresh_token: "refresh-1".into(),
    }));
    let client = ApiClient::new(base_url, store);

    let body: serde_json::Value = client.get_json("/api/widget").await.unwrap();
    assert_eq!(body["data"], "ok");
    assert_eq!(server.refresh_calls(), 0);

    handle.abort();
}

#[tokio::test]
async fn auth_routes_are_exempt_from_refresh() {
    let server = ServerState::new("access-2", "refresh-1");
    let (base_url, handle) = serve(Arc::clone(&server)).await;

    let store = Arc::new(SessionStore::with_session(stale_session()));
    let client = ApiClient::new(base_url, store);

    // A 401 from a login call surfaces directly; no refresh recursion.
    let result: Result<serde_json::Value, _> = client
        .post_json("/auth/login", &serde_json::json!({"user": "x"}))
        .await;
    assert_matches!(result, Err(ClientError::Auth));
    assert_eq!(server.refresh_calls(), 0);

    handle.abort();
}

#[tokio::test]
async fn sequential_expiry_refreshes_once_and_replays() {
    let server = ServerState::new("access-2", "refresh-1");
    let (base_url, handle) = serve(Arc::clone(&server)).await;

    let store = Arc::new(SessionStore::with_session(stale_session()));
    let client = ApiClient::new(base_url, Arc::clone(&store));

    // Single caller: expiry, refresh, replay.
    let body: serde_json::Value = client.get_json("/api/widget").await.unwrap();
    assert_eq!(body["data"], "ok");
    assert_eq!(server.refresh_calls(), 1);

    // Follow-up calls reuse the refreshed credential.
    let body: serde_json::Value = client.get_json("/api/widget").await.unwrap();
    assert_eq!(body["data"], "ok");
    assert_eq!(server.refresh_calls(), 1);

    handle.abort();
}
