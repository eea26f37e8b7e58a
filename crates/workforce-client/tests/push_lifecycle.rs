mod common;

use std::time::Duration;

use common::{FakePushServer, eventually, fast_config, wait_for};
use workforce_client::{ConnectionState, Session, Store};
use workforce_core::net::messages::{ClientMessage, PushMessage};
use workforce_core::net::protocol::decode_client_message;
use workforce_core::test_helpers::make_agent;

fn init_with_agent(id: &str) -> PushMessage {
    PushMessage::Init {
        agents: vec![make_agent(id)],
        tasks: Vec::new(),
        metrics: None,
    }
}

fn session_for(server: &FakePushServer, token: &str) -> Session {
    Session::with_store(fast_config(server.base_url()), Store::with_token(token))
}

#[tokio::test]
async fn init_snapshot_populates_store() {
    let server = FakePushServer::start(init_with_agent("a1"), false).await;
    let mut session = session_for(&server, "tok");
    session.mount().await.unwrap();

    wait_for(session.store(), |s| s.agent("a1").is_some()).await;

    let uris = server.uris();
    assert_eq!(uris.len(), 1);
    assert!(uris[0].starts_with(&format!("/ws/{}", session.client_id())));
    assert!(uris[0].ends_with("?token=tok"));

    session.shutdown().await;
}

#[tokio::test]
async fn reconnects_after_server_close() {
    let server = FakePushServer::start(PushMessage::Pong, true).await;
    let mut session = session_for(&server, "tok");
    session.mount().await.unwrap();

    eventually(|| server.connections() >= 3).await;

    session.shutdown().await;
}

#[tokio::test]
async fn unmount_cancels_pending_reconnect() {
    let server = FakePushServer::start(PushMessage::Pong, true).await;
    let mut session = session_for(&server, "tok");
    session.mount().await.unwrap();
    eventually(|| server.connections() >= 1).await;

    session.unmount().await;
    assert!(!session.is_mounted());
    assert_eq!(session.connection_state(), ConnectionState::Closed);

    // Let any handshake already on the wire land before counting
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = server.connections();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connections(), settled);
}

#[tokio::test]
async fn heartbeat_pings_while_open() {
    let server = FakePushServer::start(PushMessage::Pong, false).await;
    let mut config = fast_config(server.base_url());
    config.heartbeat_interval = Duration::from_millis(50);
    let mut session = Session::with_store(config, Store::with_token("tok"));
    session.mount().await.unwrap();

    eventually(|| {
        server
            .frames()
            .iter()
            .any(|f| decode_client_message(f).ok() == Some(ClientMessage::Ping))
    })
    .await;

    session.shutdown().await;
}

#[tokio::test]
async fn token_change_remounts_with_new_token() {
    let server = FakePushServer::start(PushMessage::Pong, false).await;
    let mut session = session_for(&server, "tok-a");
    session.mount().await.unwrap();
    eventually(|| server.connections() == 1).await;

    session.set_token(Some("tok-b".to_string())).await.unwrap();
    assert!(session.is_mounted());
    eventually(|| server.connections() == 2).await;

    let uris = server.uris();
    assert!(uris[0].ends_with("token=tok-a"));
    assert!(uris[1].ends_with("token=tok-b"));
    assert_eq!(session.store().read().await.token(), Some("tok-b"));

    // Same token again is a no-op
    session.set_token(Some("tok-b".to_string())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.connections(), 2);

    session.set_token(None).await.unwrap();
    assert!(!session.is_mounted());
    assert!(!session.store().read().await.is_authenticated());
}

#[tokio::test]
async fn dropping_mounted_session_stops_reconnecting() {
    let server = FakePushServer::start(PushMessage::Pong, true).await;
    let mut session = session_for(&server, "tok");
    session.mount().await.unwrap();
    eventually(|| server.connections() >= 2).await;

    drop(session);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = server.connections();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connections(), settled);
}
