use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use workforce_gateway::config::GatewayConfig;
use workforce_gateway::{build_app, spawn_background_tasks};

fn init_tracing() {
    let builder = tracing_subscriber::fmt().with_env_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    if std::env::var("WORKFORCE_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = GatewayConfig::load();
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Refusing to start");
        std::process::exit(1);
    }

    let addr: SocketAddr = match config.listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, addr = %config.listen_addr, "Invalid listen address");
            std::process::exit(1);
        },
    };
    let mode = config.backend.mode;
    let backend_url = config.backend.url.clone();

    let (app, state) = build_app(config);
    spawn_background_tasks(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Failed to bind");
            std::process::exit(1);
        },
    };
    tracing::info!(%addr, ?mode, backend = %backend_url, "Workforce gateway listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
    };
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    {
        tracing::error!(error = %e, "Server error");
    }
}
