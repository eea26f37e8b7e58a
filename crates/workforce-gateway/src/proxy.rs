use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Request, State};
use axum::http::header;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as BackendMessage;

use crate::error::AppError;
use crate::state::AppState;

/// Route prefixes forwarded to the agent backend, with `/api` stripped.
const PROXIED_PREFIXES: [&str; 3] = ["/api/agents", "/api/tasks", "/api/metrics"];

/// Headers copied onto the forwarded request.
const FORWARDED_HEADERS: [header::HeaderName; 3] =
    [header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION];

/// Map a gateway path to its backend path: `/api/agents/x` -> `/agents/x`.
/// Returns `None` for paths outside the proxied prefixes.
pub fn rewrite_path(path: &str) -> Option<&str> {
    PROXIED_PREFIXES.iter().find_map(|prefix| {
        let rest = path.strip_prefix(prefix)?;
        (rest.is_empty() || rest.starts_with('/')).then(|| &path["/api".len()..])
    })
}

/// Forward an `/api/{agents,tasks,metrics}` request to the backend,
/// preserving method, query, body, and content type.
pub async fn forward(State(state): State<AppState>, request: Request) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let path = rewrite_path(parts.uri.path())
        .ok_or_else(|| AppError::NotFound("Route not found".to_string()))?;

    let mut url = format!("{}{}", state.config.backend.url.trim_end_matches('/'), path);
    if let Some(query) = parts.uri.query() {
        url.push('?');
        url.push_str(query);
    }

    let body = axum::body::to_bytes(body, state.config.limits.max_body_bytes)
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?;

    let mut outbound = state
        .http
        .request(parts.method.clone(), &url)
        .timeout(Duration::from_secs(state.config.limits.request_timeout_secs))
        .body(body);
    for name in FORWARDED_HEADERS {
        if let Some(value) = parts.headers.get(&name) {
            outbound = outbound.header(name, value.clone());
        }
    }

    let upstream = outbound.send().await.map_err(|e| {
        tracing::warn!(error = %e, %url, "Agent backend request failed");
        AppError::backend_unavailable(e)
    })?;

    let status = upstream.status();
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    let bytes = upstream
        .bytes()
        .await
        .map_err(AppError::backend_unavailable)?;
    tracing::debug!(method = %parts.method, %url, %status, "Proxied request");

    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(format!("proxy response build failed: {e}")))
}

fn to_backend(msg: Message) -> Option<BackendMessage> {
    match msg {
        Message::Text(text) => Some(BackendMessage::Text(text.as_str().to_owned().into())),
        Message::Binary(data) => Some(BackendMessage::Binary(data)),
        _ => None,
    }
}

fn from_backend(msg: BackendMessage) -> Option<Message> {
    match msg {
        BackendMessage::Text(text) => Some(Message::Text(text.as_str().to_owned().into())),
        BackendMessage::Binary(data) => Some(Message::Binary(data)),
        _ => None,
    }
}

/// Relay a dashboard socket to `<backend ws>/ws/{client_id}` until either
/// side closes.
pub async fn relay_socket(mut socket: WebSocket, state: &AppState, client_id: &str) {
    let url = format!("{}/ws/{}", state.config.backend.ws_url(), client_id);
    let backend = match tokio_tungstenite::connect_async(&url).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            tracing::warn!(error = %e, %url, "Agent backend WebSocket unavailable");
            let _ = socket.send(Message::Close(None)).await;
            return;
        },
    };

    let (mut client_tx, mut client_rx) = socket.split();
    let (mut backend_tx, mut backend_rx) = backend.split();

    let upstream = async {
        while let Some(Ok(msg)) = client_rx.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
            if let Some(msg) = to_backend(msg)
                && backend_tx.send(msg).await.is_err()
            {
                break;
            }
        }
        let _ = backend_tx.close().await;
    };
    let downstream = async {
        while let Some(Ok(msg)) = backend_rx.next().await {
            if matches!(msg, BackendMessage::Close(_)) {
                break;
            }
            if let Some(msg) = from_backend(msg)
                && client_tx.send(msg).await.is_err()
            {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        () = upstream => {},
        () = downstream => {},
    }
    tracing::debug!(client_id, "WebSocket relay closed");
}
