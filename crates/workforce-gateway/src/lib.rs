pub mod api;
pub mod auth;
pub mod auth_api;
pub mod config;
pub mod error;
pub mod executor;
pub mod health;
pub mod hub;
pub mod proxy;
pub mod rate_limit;
pub mod request_log;
pub mod state;
pub mod templates;
pub mod users;
pub mod workforce;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::handler::HandlerWithoutStateExt;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::routing::{any, delete, get, post};
use axum::{Json, Router, middleware};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;

use config::{BackendMode, GatewayConfig};
use state::AppState;

/// Interval between sweeps of idle rate-limit buckets.
const RATE_LIMIT_SWEEP: Duration = Duration::from_secs(15 * 60);

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Route not found" })),
    )
}

/// Agent, task, and metrics routes served by the in-memory workforce.
fn local_routes() -> Router<AppState> {
    Router::new()
        .route("/api/agents", get(api::list_agents))
        .route("/api/agents/deploy", post(api::deploy_agent))
        .route("/api/agents/{agent_id}", delete(api::terminate_agent))
        .route("/api/agents/{agent_id}/status", get(api::agent_status))
        .route("/api/tasks", get(api::list_tasks))
        .route("/api/tasks/submit", post(api::submit_task))
        .route("/api/tasks/{task_id}", get(api::get_task))
        .route("/api/metrics", get(api::metrics))
}

/// The same surface forwarded to the remote agent backend.
fn proxy_routes() -> Router<AppState> {
    Router::new()
        .route("/api/agents", any(proxy::forward))
        .route("/api/agents/{*rest}", any(proxy::forward))
        .route("/api/tasks", any(proxy::forward))
        .route("/api/tasks/{*rest}", any(proxy::forward))
        .route("/api/metrics", any(proxy::forward))
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);
    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(frontend_url, "Invalid frontend_url, CORS origin not allowed");
            layer
        },
    }
}

/// Build the Axum router and application state from a config.
pub fn build_app(config: GatewayConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);
    let cfg = Arc::clone(&state.config);

    let backend_routes = match cfg.backend.mode {
        BackendMode::Local => local_routes(),
        BackendMode::Proxy => proxy_routes(),
    };

    // Behind bearer auth
    let protected = backend_routes
        .route("/api/workforce/templates", get(templates::list_templates))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::bearer_auth_middleware,
        ));

    let api = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/demo", post(auth_api::demo))
        .route("/api/auth/refresh", post(auth_api::refresh))
        .merge(protected)
        .layer(TimeoutLayer::new(Duration::from_secs(
            cfg.limits.request_timeout_secs,
        )))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ));

    let app = Router::new()
        .route("/ws/{client_id}", get(ws::ws_handler))
        .merge(api)
        .fallback_service(
            ServeDir::new(&cfg.web_root)
                .call_fallback_on_method_not_allowed(true)
                .not_found_service(not_found.into_service()),
        )
        .layer(DefaultBodyLimit::max(cfg.limits.max_body_bytes))
        .layer(RequestBodyLimitLayer::new(cfg.limits.max_body_bytes))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(cors_layer(&cfg.frontend_url))
        .layer(middleware::from_fn(request_log::request_log_middleware))
        .with_state(state.clone());

    (app, state)
}

/// Start background maintenance tasks for a built app.
pub fn spawn_background_tasks(state: AppState) {
    rate_limit::spawn_cleanup(state, RATE_LIMIT_SWEEP);
}
