use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use workforce_core::net::messages::{ClientMessage, PushMessage};
use workforce_core::net::protocol::{decode_push_message, encode_client_message};

use workforce_gateway::build_app;
use workforce_gateway::config::{AuthFileConfig, Environment, GatewayConfig, LocalConfig};
use workforce_gateway::state::AppState;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    _shutdown: tokio::task::JoinHandle<()>,
}

/// Local-mode config with a fixed secret and a short execution delay.
pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        auth: AuthFileConfig {
            jwt_secret: "test-secret".to_string(),
            environment: Environment::Test,
            ..AuthFileConfig::default()
        },
        local: LocalConfig {
            execution_delay_ms: 10,
            ..LocalConfig::default()
        },
        ..GatewayConfig::default()
    }
}

impl TestServer {
    pub async fn new() -> Self {
        Self::from_config(test_config()).await
    }

    pub async fn from_config(config: GatewayConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, client_id: &str, token: &str) -> String {
        format!("ws://{}/ws/{}?token={}", self.addr, client_id, token)
    }
}

/// Log in through `/api/auth/demo` and return the access token.
pub async fn demo_token(server: &TestServer) -> String {
    let body: serde_json::Value = reqwest::Client::new()
        .post(server.url("/api/auth/demo"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["accessToken"].as_str().unwrap().to_string()
}

/// Deploy an agent and return its id.
pub async fn deploy_agent(server: &TestServer, token: &str, agent_type: &str) -> String {
    let resp = reqwest::Client::new()
        .post(server.url("/api/agents/deploy"))
        .bearer_auth(token)
        .json(&serde_json::json!({ "agent_type": agent_type, "name": "Test agent" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

/// Submit a task and return its id.
pub async fn submit_task(server: &TestServer, token: &str, agent_id: &str, task_type: &str) -> String {
    let resp = reqwest::Client::new()
        .post(server.url("/api/tasks/submit"))
        .bearer_auth(token)
        .json(&serde_json::json!({
            "agent_id": agent_id,
            "task_type": task_type,
            "payload": { "code": "fn main() {}" },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "queued");
    body["task_id"].as_str().unwrap().to_string()
}

pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Read the next push message (5s timeout).
pub async fn ws_read_push(stream: &mut WsStream) -> PushMessage {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return decode_push_message(text.as_str()).unwrap(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for push message")
}

/// Read push messages until one matches `pred`, returning everything read.
pub async fn ws_read_until(
    stream: &mut WsStream,
    mut pred: impl FnMut(&PushMessage) -> bool,
) -> Vec<PushMessage> {
    let mut seen = Vec::new();
    loop {
        let msg = ws_read_push(stream).await;
        let done = pred(&msg);
        seen.push(msg);
        if done {
            return seen;
        }
    }
}

pub async fn ws_send_ping(stream: &mut WsStream) {
    let encoded = encode_client_message(&ClientMessage::Ping).unwrap();
    stream.send(Message::Text(encoded.into())).await.unwrap();
}
