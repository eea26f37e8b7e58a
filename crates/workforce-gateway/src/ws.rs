use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use workforce_core::net::messages::{ClientMessage, PushMessage};
use workforce_core::net::protocol::{
    MAX_MESSAGE_SIZE, ProtocolError, decode_client_message, encode_push_message,
};

use crate::auth::bearer_token;
use crate::config::BackendMode;
use crate::error::AppError;
use crate::proxy;
use crate::state::{AppState, ConnectionGuard};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
}

fn valid_client_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// GET /ws/{client_id}?token=...
///
/// The token may also arrive as `Authorization: Bearer`. Connections beyond
/// `max_ws_connections` are refused with 503.
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = query
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| AppError::Unauthorized("Missing token".to_string()))?;
    let identity = state.auth.authenticate(token)?;

    if !valid_client_id(&client_id) {
        return Err(AppError::BadRequest("Invalid client id".to_string()));
    }

    let max = state.config.limits.max_ws_connections;
    let guard = ConnectionGuard::try_acquire(Arc::clone(&state.ws_connection_count), max)
        .ok_or_else(|| {
            tracing::warn!(max, "WS connection limit reached");
            AppError::Unavailable("Too many connections".to_string())
        })?;

    tracing::info!(client_id = %client_id, user_id = %identity.id, "Dashboard connected");
    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            let _guard = guard;
            match state.config.backend.mode {
                BackendMode::Local => serve_local(socket, &state, &client_id).await,
                BackendMode::Proxy => proxy::relay_socket(socket, &state, &client_id).await,
            }
            tracing::info!(client_id = %client_id, "Dashboard disconnected");
        }))
}

async fn send_push(sender: &mut SplitSink<WebSocket, Message>, msg: &PushMessage) -> bool {
    match encode_push_message(msg) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode push message");
            true
        },
    }
}

/// Local mode: send `init`, then forward hub messages in order and answer
/// heartbeats until either side goes away.
async fn serve_local(socket: WebSocket, state: &AppState, client_id: &str) {
    let (mut sender, mut receiver) = socket.split();

    let (mut updates, init) = {
        let wf = state.workforce.read().await;
        wf.subscribe_with_init(state.config.limits.init_task_limit)
    };
    if !send_push(&mut sender, &init).await {
        return;
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                },
                Err(RecvError::Lagged(missed)) => {
                    // The client resyncs from a fresh init on reconnect.
                    tracing::warn!(client_id, missed, "Push subscriber lagged, closing");
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::AGAIN,
                            reason: Utf8Bytes::from_static("lagged"),
                        })))
                        .await;
                    break;
                },
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => {
                if !handle_incoming(incoming, &mut sender, client_id).await {
                    break;
                }
            },
        }
    }
}

/// Handle one frame from the dashboard. Returns `false` when the connection
/// should end.
async fn handle_incoming(
    incoming: Option<Result<Message, axum::Error>>,
    sender: &mut SplitSink<WebSocket, Message>,
    client_id: &str,
) -> bool {
    let text = match incoming {
        Some(Ok(Message::Text(text))) => text,
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return false,
        Some(Ok(_)) => return true,
    };
    match decode_client_message(text.as_str()) {
        Ok(ClientMessage::Ping) => send_push(sender, &PushMessage::Pong).await,
        Err(ProtocolError::UnknownMessageType(kind)) => {
            tracing::debug!(client_id, kind = %kind, "Ignoring unknown client message");
            true
        },
        Err(e) => {
            tracing::debug!(client_id, error = %e, "Ignoring malformed client message");
            true
        },
    }
}
