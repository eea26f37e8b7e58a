use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use workforce_core::net::messages::ClientMessage;
use workforce_core::net::protocol::encode_client_message;

use crate::backoff::ReconnectPolicy;
use crate::dispatch::apply_push_frame;
use crate::notifications::Notifier;
use crate::store::{SharedStore, Store};

type PushStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound frames queued by the heartbeat.
const OUTBOUND_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// `client-` followed by six random lowercase base-36 characters.
pub fn generate_client_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
        .collect();
    format!("client-{suffix}")
}

/// `<ws base>/ws/<client_id>?token=<token>`
pub fn push_url(ws_base: &str, client_id: &str, token: &str) -> String {
    format!(
        "{}/ws/{}?token={}",
        ws_base.trim_end_matches('/'),
        client_id,
        token
    )
}

/// Owns the push-channel lifecycle: connect, apply frames to the store,
/// and reconnect after every close until cancelled. A handshake refused with
/// 401 clears the session and cancels the mount instead of retrying.
pub struct PushClient {
    url: String,
    store: SharedStore,
    notifier: Notifier,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    outbound_tx: mpsc::Sender<ClientMessage>,
    outbound_rx: mpsc::Receiver<ClientMessage>,
}

impl PushClient {
    pub fn new(url: String, store: SharedStore, notifier: Notifier, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        Self {
            url,
            store,
            notifier,
            policy,
            state,
            outbound_tx,
            outbound_rx,
        }
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            state: self.state.subscribe(),
            outbound: self.outbound_tx.clone(),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            let modified = *current != state;
            *current = state;
            modified
        });
    }

    /// Run until `cancel` fires. Cancellation aborts a pending connect or
    /// reconnect sleep and closes a live connection.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut attempt: u32 = 0;
        loop {
            self.set_state(ConnectionState::Connecting);
            let connect = tokio::select! {
                () = cancel.cancelled() => break,
                result = tokio_tungstenite::connect_async(self.url.as_str()) => result,
            };
            match connect {
                Ok((stream, _)) => {
                    attempt = 0;
                    self.set_state(ConnectionState::Open);
                    tracing::info!("Push channel connected");
                    let cancelled = self.serve(stream, &cancel).await;
                    self.set_state(ConnectionState::Closed);
                    if cancelled {
                        break;
                    }
                },
                Err(WsError::Http(resp)) if resp.status() == StatusCode::UNAUTHORIZED => {
                    tracing::warn!("Push channel rejected the session token, logging out");
                    self.store.update(Store::clear_session).await;
                    cancel.cancel();
                    break;
                },
                Err(e) => {
                    self.set_state(ConnectionState::Closed);
                    tracing::debug!(error = %e, "Push channel connect failed");
                },
            }

            let delay = self.policy.delay(attempt);
            attempt = attempt.saturating_add(1);
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt,
                "Push channel disconnected, reconnecting"
            );
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {},
            }
        }
        self.set_state(ConnectionState::Closed);
        tracing::debug!("Push channel stopped");
    }

    /// Pump one open connection. Returns `true` when it ended because of
    /// cancellation.
    async fn serve(&mut self, stream: PushStream, cancel: &CancellationToken) -> bool {
        let (mut sink, mut frames) = stream.split();

        // Pings queued for an earlier connection are stale.
        while self.outbound_rx.try_recv().is_ok() {}

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return true;
                },
                frame = frames.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let raised = self
                            .store
                            .update(|s| apply_push_frame(s, text.as_str()))
                            .await;
                        for id in raised {
                            self.notifier.schedule_expiry(id);
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "Push channel error");
                        return false;
                    },
                    Some(Ok(_)) => {},
                },
                Some(msg) = self.outbound_rx.recv() => {
                    let text = match encode_client_message(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to encode client message");
                            continue;
                        },
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        return false;
                    }
                },
            }
        }
    }
}

/// Periodic keepalive. Sends `ping` only while the channel is open; beats in
/// any other state are silently skipped.
#[derive(Clone)]
pub struct Heartbeat {
    state: watch::Receiver<ConnectionState>,
    outbound: mpsc::Sender<ClientMessage>,
}

impl Heartbeat {
    /// Queue one `ping` if the channel is open. Returns whether it was queued.
    pub fn beat(&self) -> bool {
        if *self.state.borrow() != ConnectionState::Open {
            return false;
        }
        self.outbound.try_send(ClientMessage::Ping).is_ok()
    }

    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.beat();
                },
            }
        }
    }
}
