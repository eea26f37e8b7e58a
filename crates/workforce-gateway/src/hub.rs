use axum::extract::ws::Utf8Bytes;
use tokio::sync::broadcast;

use workforce_core::net::messages::PushMessage;
use workforce_core::net::protocol::encode_push_message;

/// Fan-out of encoded push messages to every connected dashboard.
///
/// Messages are encoded once and shared; each subscriber sees them in send
/// order. A subscriber that falls more than the channel capacity behind gets
/// `RecvError::Lagged` and is expected to drop its connection.
#[derive(Clone)]
pub struct PushHub {
    tx: broadcast::Sender<Utf8Bytes>,
}

impl PushHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Encode and broadcast a message. Returns the number of receivers.
    pub fn publish(&self, msg: &PushMessage) -> usize {
        match encode_push_message(msg) {
            Ok(text) => self.tx.send(Utf8Bytes::from(text)).unwrap_or(0),
            Err(e) => {
                tracing::warn!(error = %e, kind = msg.tag(), "Failed to encode push message");
                0
            },
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Utf8Bytes> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
