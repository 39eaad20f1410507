//! Live push-event subscription over WebSocket.
//!
//! Connects to the API's `/ws` endpoint, presents the access token as the
//! first frame (the server's handshake contract), then feeds every
//! `asset_processed` event into the [`StateSynchronizer`]. Reconnects
//! with a fixed delay when the connection drops; events emitted while
//! disconnected are lost by design (best-effort delivery, no replay).

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use soledex_events::AssetEvent;

use crate::session::SessionStore;
use crate::sync::StateSynchronizer;

/// Reconnection delay after a WebSocket failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Run the subscription loop until cancelled.
///
/// `ws_url` is the full WebSocket endpoint, e.g.
/// `ws://localhost:3000/api/v1/ws`.
pub async fn run(
    ws_url: &str,
    store: Arc<SessionStore>,
    sync: &mut StateSynchronizer,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let (session, _) = store.snapshot().await;
        let Some(session) = session else {
            // Signed out: wait for a session before connecting.
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
            }
        };

        tracing::info!(url = %ws_url, "Connecting to push channel");
        match connect_async(ws_url).await {
            Ok((ws_stream, _response)) => {
                run_session(ws_stream, &session.access_token, sync, &cancel).await;
                if cancel.is_cancelled() {
                    return;
                }
                tracing::warn!("Push channel session ended, reconnecting");
            }
            Err(e) => {
                tracing::error!(error = %e, "Push channel connection failed");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

/// Drive a single WebSocket session: handshake, then apply events.
async fn run_session(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    access_token: &str,
    sync: &mut StateSynchronizer,
    cancel: &CancellationToken,
) {
    let (mut sink, mut stream) = ws_stream.split();

    // Handshake: the credential is the first frame.
    let credential = serde_json::json!({ "token": access_token }).to_string();
    if let Err(e) = sink.send(Message::Text(credential)).await {
        tracing::error!(error = %e, "Failed to send credential frame");
        return;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&text, sync);
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Server closed push channel");
                        return;
                    }
                    Some(Ok(_)) => {
                        // Binary / Frame -- ignore.
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Push channel receive error");
                        return;
                    }
                    None => {
                        tracing::info!("Push channel stream exhausted");
                        return;
                    }
                }
            }
        }
    }
}

/// Dispatch one inbound text frame.
fn handle_frame(text: &str, sync: &mut StateSynchronizer) {
    // Handshake outcomes arrive as {"event": "connected"} or
    // {"error": "<reason>"}; everything else should be an asset event.
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, raw = %text, "Unparseable push frame");
            return;
        }
    };

    if let Some(reason) = value.get("error").and_then(|v| v.as_str()) {
        tracing::warn!(reason, "Push channel rejected");
        return;
    }

    match value.get("event").and_then(|v| v.as_str()) {
        Some("asset_processed") => match serde_json::from_value::<AssetEvent>(value) {
            Ok(event) => sync.apply_event(&event),
            Err(e) => {
                tracing::warn!(error = %e, "Malformed asset event");
            }
        },
        Some("connected") => {
            tracing::info!("Push channel established");
        }
        other => {
            tracing::debug!(event = ?other, "Ignoring unknown push frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soledex_core::status::AssetStatus;

    #[test]
    fn asset_event_frames_reach_the_synchronizer() {
        let (mut sync, mut rx) = StateSynchronizer::new();

        let frame = serde_json::json!({
            "event": "asset_processed",
            "assetId": 4,
            "status": "active",
            "aiMetadata": {"brand": {"value": "Nike", "confidence": 0.8}},
            "timestamp": chrono::Utc::now(),
        })
        .to_string();
        handle_frame(&frame, &mut sync);

        assert_eq!(sync.cache().get(4).unwrap().status, AssetStatus::Active);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn rejection_and_ack_frames_do_not_touch_the_cache() {
        let (mut sync, mut rx) = StateSynchronizer::new();

        handle_frame(r#"{"error": "token expired"}"#, &mut sync);
        handle_frame(r#"{"event": "connected"}"#, &mut sync);
        handle_frame("not json at all", &mut sync);

        assert!(sync.cache().is_empty());
        assert!(rx.try_recv().is_err());
    }
}
