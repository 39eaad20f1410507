//! Authenticated WebSocket upgrade handler.
//!
//! The HTTP upgrade is always accepted; authentication happens on the
//! socket itself. The client's first text frame must be
//! `{"token": "<jwt>"}` within a bounded window. Exactly three rejection
//! reasons exist, reported verbatim in an error frame before the close:
//!
//! - `"authentication required"` -- no credential supplied
//! - `"invalid token"`           -- signature/structure verification failed
//! - `"token expired"`           -- valid signature, validity window passed
//!
//! On success the connection joins the owner's room and stays subscribed
//! until disconnect.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::auth::jwt::{validate_token, Claims, JwtConfig, TokenError};
use crate::state::AppState;

/// How long the server waits for the credential frame.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake rejection states. Each maps to exactly one wire literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeReject {
    MissingCredential,
    InvalidToken,
    TokenExpired,
}

impl HandshakeReject {
    /// The literal reason string sent to the client.
    pub fn reason(&self) -> &'static str {
        match self {
            HandshakeReject::MissingCredential => "authentication required",
            HandshakeReject::InvalidToken => "invalid token",
            HandshakeReject::TokenExpired => "token expired",
        }
    }
}

/// Credential payload expected as the first text frame.
#[derive(Debug, Deserialize)]
struct CredentialFrame {
    token: Option<String>,
}

/// Decide the outcome of a connection attempt from its credential frame.
///
/// `frame` is the first text frame, if any arrived in time.
fn authenticate(frame: Option<&str>, jwt: &JwtConfig) -> Result<Claims, HandshakeReject> {
    let Some(frame) = frame else {
        return Err(HandshakeReject::MissingCredential);
    };

    // An unparseable frame or one without a token field supplies no
    // credential at all.
    let credential: CredentialFrame =
        serde_json::from_str(frame).map_err(|_| HandshakeReject::MissingCredential)?;
    let Some(token) = credential.token else {
        return Err(HandshakeReject::MissingCredential);
    };

    validate_token(&token, jwt).map_err(|e| match e {
        TokenError::Expired => HandshakeReject::TokenExpired,
        TokenError::Invalid => HandshakeReject::InvalidToken,
    })
}

/// HTTP handler that upgrades the connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Runs the credential handshake, then:
///   1. Registers the connection in the owner's room.
///   2. Spawns a sender task that forwards room messages to the sink.
///   3. Processes inbound messages on the current task.
///   4. Cleans up on disconnect.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let claims = match await_credential(&mut socket, &state.config.jwt).await {
        Ok(claims) => claims,
        Err(reject) => {
            tracing::info!(reason = reject.reason(), "WebSocket handshake rejected");
            let frame = serde_json::json!({ "error": reject.reason() }).to_string();
            let _ = socket.send(Message::Text(frame.into())).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let owner_id = claims.sub;
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, owner_id, "WebSocket connected");

    // Register in the owner's room and get the outbound receiver.
    let mut rx = state.rooms.join(conn_id.clone(), owner_id).await;

    // Acknowledge the handshake so clients can start their receive loop.
    let ack = serde_json::json!({ "event": "connected" }).to_string();
    let _ = socket.send(Message::Text(ack.into())).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward room messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Receiver loop: process inbound messages.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_msg) => {
                // Push-only channel: inbound frames after the handshake
                // are ignored.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: remove connection and abort sender task.
    state.rooms.leave(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, owner_id, "WebSocket disconnected");
}

/// Wait for the credential frame and authenticate it.
///
/// A timeout, a closed socket, or a non-text first frame all count as
/// "no credential supplied".
async fn await_credential(
    socket: &mut WebSocket,
    jwt: &JwtConfig,
) -> Result<Claims, HandshakeReject> {
    let frame = match tokio::time::timeout(AUTH_TIMEOUT, socket.recv()).await {
        Ok(Some(Ok(Message::Text(text)))) => Some(text.to_string()),
        _ => None,
    };
    authenticate(frame.as_deref(), jwt)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::generate_access_token;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn test_jwt() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        }
    }

    #[test]
    fn missing_frame_requires_authentication() {
        let err = authenticate(None, &test_jwt()).unwrap_err();
        assert_eq!(err, HandshakeReject::MissingCredential);
        assert_eq!(err.reason(), "authentication required");
    }

    #[test]
    fn frame_without_token_field_requires_authentication() {
        let err = authenticate(Some(r#"{"hello": "world"}"#), &test_jwt()).unwrap_err();
        assert_eq!(err.reason(), "authentication required");
    }

    #[test]
    fn unparseable_frame_requires_authentication() {
        let err = authenticate(Some("not json"), &test_jwt()).unwrap_err();
        assert_eq!(err.reason(), "authentication required");
    }

    #[test]
    fn structurally_invalid_token_is_rejected() {
        let err =
            authenticate(Some(r#"{"token": "garbage.token.here"}"#), &test_jwt()).unwrap_err();
        assert_eq!(err, HandshakeReject::InvalidToken);
        assert_eq!(err.reason(), "invalid token");
    }

    #[test]
    fn wrong_secret_token_is_rejected_as_invalid() {
        let other = JwtConfig {
            secret: "a-completely-different-secret".to_string(),
            access_token_expiry_mins: 15,
        };
        let token = generate_access_token(1, &other).unwrap();
        let frame = format!(r#"{{"token": "{token}"}}"#);

        let err = authenticate(Some(&frame), &test_jwt()).unwrap_err();
        assert_eq!(err.reason(), "invalid token");
    }

    #[test]
    fn expired_token_is_rejected_as_expired() {
        let jwt = test_jwt();

        // Validly signed, expired well past the 60-second leeway.
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: 5,
            exp: now - 300,
            iat: now - 600,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(jwt.secret.as_bytes()),
        )
        .unwrap();
        let frame = format!(r#"{{"token": "{token}"}}"#);

        let err = authenticate(Some(&frame), &jwt).unwrap_err();
        assert_eq!(err, HandshakeReject::TokenExpired);
        assert_eq!(err.reason(), "token expired");
    }

    #[test]
    fn valid_token_yields_claims() {
        let jwt = test_jwt();
        let token = generate_access_token(77, &jwt).unwrap();
        let frame = format!(r#"{{"token": "{token}"}}"#);

        let claims = authenticate(Some(&frame), &jwt).expect("handshake should succeed");
        assert_eq!(claims.sub, 77);
    }
}
