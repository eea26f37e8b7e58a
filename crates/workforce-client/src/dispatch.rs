use workforce_core::model::TaskStatus;
use workforce_core::net::messages::PushMessage;
use workforce_core::net::protocol::{ProtocolError, decode_push_message};

use crate::notifications::{NotificationId, NotificationKind};
use crate::store::Store;

/// Apply one push message to the store. Returns the ids of notifications it
/// raised so the caller can schedule their expiry.
pub fn apply_push_message(store: &mut Store, msg: PushMessage) -> Vec<NotificationId> {
    let mut raised = Vec::new();
    match msg {
        PushMessage::Init {
            agents,
            tasks,
            metrics,
        } => {
            store.replace_agents(agents);
            for task in tasks {
                store.merge_task(task);
            }
            if let Some(metrics) = metrics {
                store.replace_metrics(metrics);
            }
        },
        PushMessage::AgentsUpdate { agents } => store.replace_agents(agents),
        PushMessage::TaskUpdate { task } => {
            let task = *task;
            let notification = match task.status {
                TaskStatus::Completed => Some((
                    NotificationKind::Success,
                    format!("Task {} completed", task.id),
                    Some(task.agent_id.clone()),
                )),
                TaskStatus::Failed => Some((
                    NotificationKind::Error,
                    format!(
                        "Task {} failed: {}",
                        task.id,
                        task.error.as_deref().unwrap_or("Unknown error")
                    ),
                    None,
                )),
                TaskStatus::Queued | TaskStatus::Running => None,
            };
            store.merge_task(task);
            if let Some((kind, message, agent_id)) = notification {
                raised.push(store.push_notification(kind, message, agent_id));
            }
        },
        PushMessage::MetricsUpdate { metrics } => {
            if let Some(metrics) = metrics {
                store.replace_metrics(metrics);
            }
        },
        PushMessage::Pong => {},
    }
    raised
}

/// Decode a text frame and apply it. Frames with unknown tags and frames
/// that fail to decode are logged and otherwise ignored.
pub fn apply_push_frame(store: &mut Store, text: &str) -> Vec<NotificationId> {
    match decode_push_message(text) {
        Ok(msg) => {
            tracing::trace!(kind = msg.tag(), "Push message");
            apply_push_message(store, msg)
        },
        Err(ProtocolError::UnknownMessageType(kind)) => {
            tracing::debug!(kind = %kind, "Unknown push message type");
            Vec::new()
        },
        Err(e) => {
            tracing::warn!(error = %e, "Failed to decode push message");
            Vec::new()
        },
    }
}
