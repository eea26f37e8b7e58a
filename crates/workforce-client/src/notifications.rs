use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use workforce_core::time::{Timestamp, serde_utc};

use crate::store::SharedStore;

/// Maximum notifications kept; older ones fall off the end.
pub const MAX_NOTIFICATIONS: usize = 10;

/// How long a notification stays visible unless dismissed first.
pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_secs(5);

/// Creation time in epoch millis, bumped so ids strictly increase.
pub type NotificationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(with = "serde_utc")]
    pub created_at: Timestamp,
}

/// Newest-first list of transient notifications.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    items: Vec<Notification>,
    last_id: NotificationId,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a notification and return its id.
    pub fn push(
        &mut self,
        kind: NotificationKind,
        message: impl Into<String>,
        agent_id: Option<String>,
    ) -> NotificationId {
        let created_at = workforce_core::time::now();
        let millis = u64::try_from(created_at.timestamp_millis()).unwrap_or(0);
        let id = millis.max(self.last_id + 1);
        self.last_id = id;

        self.items.insert(
            0,
            Notification {
                id,
                kind,
                message: message.into(),
                agent_id,
                created_at,
            },
        );
        self.items.truncate(MAX_NOTIFICATIONS);
        id
    }

    /// Remove one notification. Unknown ids (already expired, dismissed, or
    /// pushed off the end) are a no-op returning `false`.
    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Raises notifications on a shared store and expires each one after `ttl`.
///
/// Expiry timers run on `tracker` and stop when `shutdown` is cancelled.
#[derive(Clone)]
pub struct Notifier {
    store: SharedStore,
    ttl: Duration,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Notifier {
    pub fn new(
        store: SharedStore,
        ttl: Duration,
        tracker: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            ttl,
            tracker,
            shutdown,
        }
    }

    pub async fn notify(
        &self,
        kind: NotificationKind,
        message: impl Into<String>,
        agent_id: Option<String>,
    ) -> NotificationId {
        let message = message.into();
        let id = self
            .store
            .update(|s| s.push_notification(kind, message, agent_id))
            .await;
        self.schedule_expiry(id);
        id
    }

    /// Start the expiry timer for a notification already in the store.
    pub fn schedule_expiry(&self, id: NotificationId) {
        let store = self.store.clone();
        let ttl = self.ttl;
        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {},
                () = tokio::time::sleep(ttl) => {
                    store.update(|s| s.dismiss_notification(id)).await;
                },
            }
        });
    }

    pub async fn dismiss(&self, id: NotificationId) -> bool {
        self.store.update(|s| s.dismiss_notification(id)).await
    }
}
