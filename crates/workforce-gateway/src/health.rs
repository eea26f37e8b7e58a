use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::config::BackendMode;
use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub services: ServiceHealth,
    pub connections: ConnectionInfo,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub gateway: &'static str,
    pub agent_backend: &'static str,
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
}

/// Probe the remote backend's `/health`: `ok` on 2xx, `degraded` on any
/// other status, `unreachable` when the request fails or times out.
async fn probe_backend(state: &AppState) -> &'static str {
    let url = format!("{}/health", state.config.backend.url.trim_end_matches('/'));
    let timeout = Duration::from_millis(state.config.backend.health_timeout_ms);
    match state.http.get(&url).timeout(timeout).send().await {
        Ok(resp) if resp.status().is_success() => "ok",
        Ok(resp) => {
            tracing::debug!(status = %resp.status(), "Agent backend degraded");
            "degraded"
        },
        Err(e) => {
            tracing::debug!(error = %e, "Agent backend unreachable");
            "unreachable"
        },
    }
}

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let agent_backend = match state.config.backend.mode {
        BackendMode::Local => "ok",
        BackendMode::Proxy => probe_backend(&state).await,
    };

    Json(HealthResponse {
        status: "ok",
        timestamp: workforce_core::time::format_timestamp(&workforce_core::time::now()),
        services: ServiceHealth {
            gateway: "ok",
            agent_backend,
        },
        connections: ConnectionInfo {
            websocket: state.ws_connection_count.load(Ordering::Relaxed),
        },
        version: env!("CARGO_PKG_VERSION"),
    })
}
