#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use workforce_client::backoff::ReconnectPolicy;
use workforce_client::{SharedStore, Store, SyncConfig};
use workforce_core::net::messages::PushMessage;
use workforce_core::net::protocol::encode_push_message;
use workforce_gateway::build_app;
use workforce_gateway::config::{AuthFileConfig, Environment, GatewayConfig, LocalConfig};

/// A local-mode gateway on an ephemeral port.
pub struct Gateway {
    pub addr: SocketAddr,
    _handle: tokio::task::JoinHandle<()>,
}

impl Gateway {
    pub async fn start() -> Self {
        let config = GatewayConfig {
            auth: AuthFileConfig {
                jwt_secret: "client-test-secret".to_string(),
                environment: Environment::Test,
                ..AuthFileConfig::default()
            },
            local: LocalConfig {
                execution_delay_ms: 10,
                ..LocalConfig::default()
            },
            ..GatewayConfig::default()
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (app, _state) = build_app(config);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        Self {
            addr,
            _handle: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Sync config pointed at `server_url` with fast timers. The reconciliation
/// poll is effectively off unless a test turns it on.
pub fn fast_config(server_url: String) -> SyncConfig {
    SyncConfig {
        server_url,
        reconnect: ReconnectPolicy::Fixed(Duration::from_millis(50)),
        heartbeat_interval: Duration::from_secs(3600),
        poll_interval: Duration::from_secs(3600),
        notification_ttl: Duration::from_secs(5),
    }
}

/// Wait until `pred` holds for the store (5s timeout).
pub async fn wait_for(store: &SharedStore, mut pred: impl FnMut(&Store) -> bool) {
    let mut revisions = store.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if pred(&*store.read().await) {
                return;
            }
            revisions.changed().await.unwrap();
        }
    })
    .await
    .expect("Timed out waiting for store condition");
}

/// What a [`FakePushServer`] has observed.
#[derive(Default)]
pub struct Observed {
    /// Request URI of every accepted push connection, in order.
    pub uris: Vec<String>,
    /// Text frames received from clients.
    pub frames: Vec<String>,
}

/// Minimal push endpoint: accepts each connection, sends `first_frame`, and
/// either holds the connection or closes it straight away.
pub struct FakePushServer {
    pub addr: SocketAddr,
    pub observed: Arc<Mutex<Observed>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl FakePushServer {
    pub async fn start(first_frame: PushMessage, close_immediately: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let observed = Arc::new(Mutex::new(Observed::default()));
        let first = encode_push_message(&first_frame).unwrap();

        let seen = Arc::clone(&observed);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((tcp, _)) = listener.accept().await else {
                    return;
                };
                let seen = Arc::clone(&seen);
                let first = first.clone();
                tokio::spawn(async move {
                    let uri_seen = Arc::clone(&seen);
                    let callback =
                        move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                            uri_seen.lock().unwrap().uris.push(req.uri().to_string());
                            Ok(resp)
                        };
                    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(tcp, callback).await
                    else {
                        return;
                    };
                    if ws.send(Message::Text(first.into())).await.is_err() {
                        return;
                    }
                    if close_immediately {
                        let _ = ws.close(None).await;
                        return;
                    }
                    while let Some(Ok(msg)) = ws.next().await {
                        if let Message::Text(text) = msg {
                            seen.lock().unwrap().frames.push(text.as_str().to_string());
                        }
                    }
                });
            }
        });

        Self {
            addr,
            observed,
            _handle: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.observed.lock().unwrap().uris.len()
    }

    pub fn uris(&self) -> Vec<String> {
        self.observed.lock().unwrap().uris.clone()
    }

    pub fn frames(&self) -> Vec<String> {
        self.observed.lock().unwrap().frames.clone()
    }
}

/// Poll `check` every 10ms until it holds (5s timeout).
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timed out waiting for condition");
}
