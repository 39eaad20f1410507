//! Resilient API client with single-flight session refresh.
//!
//! Every outgoing call attaches the current access token. When a call
//! comes back 401 (and is not itself an auth call, to avoid recursive
//! refresh loops), the client runs the refresh protocol:
//!
//! 1. Park on the store's refresh gate. Callers waiting here are the
//!    pending queue.
//! 2. On acquiring the gate, check the session generation. If it moved,
//!    another caller already refreshed (or cleared) -- reuse that outcome.
//! 3. Otherwise perform exactly one refresh exchange. Success installs
//!    the new token pair; failure clears the session so the initiator and
//!    every parked caller reject together.
//! 4. Replay the original request with the refreshed credential.
//!
//! Under N concurrent expiries this produces exactly one refresh network
//! call, with all N callers converging on its outcome.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::messages::describe_status;
use crate::session::{Session, SessionStore};

/// Paths that must never trigger a refresh cycle.
const AUTH_ROUTE_PREFIX: &str = "/auth/";

/// Errors surfaced to callers of [`ApiClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The call requires a session and none is available, or the server
    /// still rejects the refreshed credential.
    #[error("not authenticated")]
    Auth,

    /// The session could not be refreshed; the stored session was cleared.
    #[error("session expired")]
    SessionExpired,

    /// The server answered with a non-success status. `message` and
    /// `recoverable` come from the stable status mapping, never from the
    /// raw response.
    #[error("api error ({status}): {message}")]
    Api {
        status: u16,
        message: &'static str,
        recoverable: bool,
    },

    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Token pair returned by the refresh exchange.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

/// HTTP client for the Soledex API.
///
/// Cheap to clone; the session store is shared.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<SessionStore>,
}

impl ApiClient {
    /// Create a client for the given API base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>, store: Arc<SessionStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            store,
        }
    }

    /// The shared session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// GET `path` and decode the JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.execute(Method::GET, path, None).await?;
        Self::decode(response).await
    }

    /// POST `body` to `path` and decode the JSON response.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ClientError::Transport(format!("failed to encode request body: {e}")))?;
        let response = self.execute(Method::POST, path, Some(body)).await?;
        Self::decode(response).await
    }

    /// Login/registration/refresh calls must not recurse into refresh.
    fn is_auth_route(path: &str) -> bool {
        path.starts_with(AUTH_ROUTE_PREFIX)
    }

    /// Send the request, running the refresh protocol on session expiry.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let (session, generation) = self.store.snapshot().await;

        let response = self
            .send_once(method.clone(), path, body.as_ref(), session.as_ref())
            .await?;

        if response.status().as_u16() != 401 || Self::is_auth_route(path) {
            return Ok(response);
        }

        // Session expiry detected: refresh (or wait for the in-flight
        // refresh) and replay with the new credential.
        let refreshed = self.refresh_session(generation).await?;
        self.send_once(method, path, body.as_ref(), Some(&refreshed))
            .await
    }

    /// One plain request attempt with the given credential.
    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        session: Option<&Session>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(session) = session {
            request = request.bearer_auth(&session.access_token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    /// Single-flight refresh: at most one exchange per expiry, shared by
    /// every caller that observed it.
    ///
    /// `observed_generation` is the session generation the caller saw when
    /// it sent the request that came back 401.
    async fn refresh_session(&self, observed_generation: u64) -> Result<Session, ClientError> {
        // Pending queue: everyone parks here while one exchange runs.
        let _gate = self.store.refresh_gate().await;

        let (current, generation) = self.store.snapshot().await;
        if generation != observed_generation {
            // Someone else finished a refresh (or cleared the session)
            // while we were parked; converge on that outcome.
            return current.ok_or(ClientError::SessionExpired);
        }

        let Some(session) = current else {
            return Err(ClientError::SessionExpired);
        };

        tracing::debug!("Refreshing session");
        let response = self
            .http
            .post(format!("{}/auth/refresh", self.base_url))
            .json(&serde_json::json!({ "refreshToken": session.refresh_token }))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                let pair: RefreshResponse = response.json().await.map_err(|e| {
                    ClientError::Transport(format!("malformed refresh response: {e}"))
                })?;
                let refreshed = Session {
                    access_token: pair.access_token,
                    refresh_token: pair.refresh_token,
                };
                self.store.set(refreshed.clone()).await;
                tracing::debug!("Session refreshed");
                Ok(refreshed)
            }
            Ok(response) => {
                // Any non-success refresh outcome invalidates the session.
                tracing::warn!(status = response.status().as_u16(), "Refresh rejected");
                self.store.clear().await;
                Err(ClientError::SessionExpired)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Refresh exchange failed");
                self.store.clear().await;
                Err(ClientError::SessionExpired)
            }
        }
    }

    /// Decode a response, mapping non-success statuses to stable errors.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ClientError::Transport(format!("malformed response body: {e}")));
        }

        if status.as_u16() == 401 {
            return Err(ClientError::Auth);
        }

        let (message, recoverable) = describe_status(status.as_u16());
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
            recoverable,
        })
    }
}
