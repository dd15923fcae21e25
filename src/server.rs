use std::future::Future;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::config::{Options, OptionsPatch};
use crate::error::{PresenceError, Result};
use crate::presence::{PresenceEvent, PresenceLoop, PresenceStatus};

/// Messages pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsServerMessage {
    Status { status: PresenceStatus },
    Settings { settings: Options },
}

/// Messages accepted from WebSocket clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsClientMessage {
    /// Hello from a fresh client; triggers a snapshot push.
    Initial {},
    #[serde(other)]
    Unknown,
}

pub fn router(presence: Arc<PresenceLoop>) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/options", get(get_options).patch(patch_options))
        .route("/api/socket", get(ws_upgrade))
        .with_state(presence)
}

/// Binds the control surface and serves it until `shutdown` resolves.
pub async fn serve(
    presence: Arc<PresenceLoop>,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}...", addr);

    axum::serve(listener, router(presence))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn get_status(State(presence): State<Arc<PresenceLoop>>) -> Json<PresenceStatus> {
    Json(presence.status())
}

async fn get_options(State(presence): State<Arc<PresenceLoop>>) -> Json<Options> {
    Json(presence.options())
}

async fn patch_options(
    State(presence): State<Arc<PresenceLoop>>,
    Json(patch): Json<OptionsPatch>,
) -> impl IntoResponse {
    info!("PATCH /api/options: {:?}", patch);
    match presence.save_options(patch).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e @ (PresenceError::InvalidOption(_) | PresenceError::ConfigError(_))) => {
            warn!("Rejected options patch: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => {
            error!("Failed to apply options patch: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn ws_upgrade(
    State(presence): State<Arc<PresenceLoop>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, presence))
}

/// Relays loop events to one client and answers its snapshot requests.
async fn handle_socket(mut socket: WebSocket, presence: Arc<PresenceLoop>) {
    debug!("[ws] client connected");
    let mut events = presence.subscribe();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsClientMessage>(&text) {
                            Ok(WsClientMessage::Initial {}) => {
                                let status = WsServerMessage::Status { status: presence.status() };
                                let settings = WsServerMessage::Settings { settings: presence.options() };
                                if send(&mut socket, &status).await.is_err()
                                    || send(&mut socket, &settings).await.is_err()
                                {
                                    break;
                                }
                            }
                            Ok(WsClientMessage::Unknown) => {}
                            Err(e) => warn!("[ws] failed to parse incoming message: {}", e),
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("[ws] error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
            event = events.recv() => {
                let message = match event {
                    Ok(PresenceEvent::Status(status)) => WsServerMessage::Status { status },
                    Ok(PresenceEvent::Options(options)) => WsServerMessage::Settings { settings: options },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[ws] dropped {} events for a slow client", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if send(&mut socket, &message).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("[ws] client disconnected");
}

async fn send(socket: &mut WebSocket, message: &WsServerMessage) -> std::result::Result<(), axum::Error> {
    let text = serde_json::to_string(message).map_err(axum::Error::new)?;
    socket.send(Message::Text(text)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_messages_match_the_wire_shape() {
        let message = WsServerMessage::Status {
            status: PresenceStatus::Loading,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "status", "status": {"status": "loading"}})
        );

        let message = WsServerMessage::Settings {
            settings: Options::default(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "settings");
        assert_eq!(json["settings"]["intervalMinutes"], 2);
    }

    #[test]
    fn client_hello_parses_with_extra_fields() {
        let message: WsClientMessage =
            serde_json::from_str(r#"{"type": "initial", "dummy1": 1}"#).unwrap();
        assert!(matches!(message, WsClientMessage::Initial {}));

        let message: WsClientMessage =
            serde_json::from_str(r#"{"type": "somethingElse"}"#).unwrap();
        assert!(matches!(message, WsClientMessage::Unknown));
    }
}
