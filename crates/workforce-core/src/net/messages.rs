use serde::{Deserialize, Serialize};

use crate::model::{Agent, MetricsSnapshot, Task};

/// Every `type` tag the server may push.
pub const PUSH_MESSAGE_TYPES: &[&str] =
    &["init", "agents_update", "task_update", "metrics_update", "pong"];

/// Every `type` tag a client may send.
pub const CLIENT_MESSAGE_TYPES: &[&str] = &["ping"];

/// Server -> client push messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// Full snapshot sent right after a connection opens.
    Init {
        #[serde(default)]
        agents: Vec<Agent>,
        #[serde(default)]
        tasks: Vec<Task>,
        #[serde(default)]
        metrics: Option<MetricsSnapshot>,
    },
    AgentsUpdate {
        #[serde(default)]
        agents: Vec<Agent>,
    },
    TaskUpdate {
        task: Box<Task>,
    },
    MetricsUpdate {
        #[serde(default)]
        metrics: Option<MetricsSnapshot>,
    },
    Pong,
}

impl PushMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::AgentsUpdate { .. } => "agents_update",
            Self::TaskUpdate { .. } => "task_update",
            Self::MetricsUpdate { .. } => "metrics_update",
            Self::Pong => "pong",
        }
    }
}

/// Client -> server messages. Heartbeat only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}
