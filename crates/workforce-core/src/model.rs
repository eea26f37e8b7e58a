use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::time::{Timestamp, serde_utc, serde_utc_option};

/// Lowest accepted task priority.
pub const MIN_PRIORITY: u8 = 1;

/// Highest accepted task priority.
pub const MAX_PRIORITY: u8 = 10;

/// Priority assigned when a submission omits one.
pub const DEFAULT_PRIORITY: u8 = 5;

/// The kinds of digital worker that can be deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    CustomerSupport,
    DataEntry,
    SoftwareEngineer,
}

impl AgentType {
    pub const ALL: [AgentType; 3] = [
        AgentType::CustomerSupport,
        AgentType::DataEntry,
        AgentType::SoftwareEngineer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerSupport => "customer_support",
            Self::DataEntry => "data_entry",
            Self::SoftwareEngineer => "software_engineer",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == raw)
    }

    /// Task types this agent type knows how to execute.
    pub fn task_catalog(&self) -> &'static [&'static str] {
        match self {
            Self::CustomerSupport => &[
                "triage_ticket",
                "draft_response",
                "analyze_sentiment",
                "bulk_classify",
                "respond_to_dm",
                "reply_to_comment",
                "handle_review",
                "social_monitor",
            ],
            Self::DataEntry => &[
                "extract_fields",
                "validate_records",
                "transform_data",
                "enrich_records",
                "deduplicate",
                "parse_document",
            ],
            Self::SoftwareEngineer => &[
                "generate_code",
                "generate_project",
                "review_pr",
                "write_tests",
                "detect_bugs",
                "generate_docs",
                "refactor",
                "generate_migration",
            ],
        }
    }

    pub fn supports(&self, task_type: &str) -> bool {
        self.task_catalog().contains(&task_type)
    }

    /// Description used when a deploy request does not provide one.
    pub fn default_description(&self) -> &'static str {
        match self {
            Self::CustomerSupport => "Triages tickets, drafts responses, and monitors social channels",
            Self::DataEntry => "Extracts, validates, and enriches structured records",
            Self::SoftwareEngineer => "Generates code, reviews PRs, writes tests, and detects bugs",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Running,
    Idle,
    Terminated,
}

/// A deployed worker. Owned by the server; clients hold read-only copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    #[serde(default)]
    pub description: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(with = "serde_utc")]
    pub created_at: Timestamp,
    #[serde(default)]
    pub uptime_seconds: f64,
    #[serde(default)]
    pub tasks_completed: u64,
    #[serde(default)]
    pub tasks_failed: u64,
    #[serde(default)]
    pub current_task: Option<String>,
}

/// Task lifecycle. Transitions only move forward:
/// `queued -> running -> {completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Position in the lifecycle; both terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work submitted to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub agent_id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default = "default_priority")]
    pub priority: u8,
    pub status: TaskStatus,
    #[serde(with = "serde_utc")]
    pub created_at: Timestamp,
    #[serde(default, with = "serde_utc_option")]
    pub started_at: Option<Timestamp>,
    #[serde(default, with = "serde_utc_option")]
    pub finished_at: Option<Timestamp>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl Task {
    /// True when any field the dashboard reconciles on (status, result,
    /// error) differs from `other`.
    pub fn sync_differs(&self, other: &Task) -> bool {
        self.status != other.status || self.result != other.result || self.error != other.error
    }

    /// True when replacing `self` with `incoming` would move the task back
    /// to an earlier lifecycle stage.
    pub fn would_regress_to(&self, incoming: &Task) -> bool {
        incoming.status.rank() < self.status.rank()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentCounts {
    pub total: usize,
    pub running: usize,
    pub idle: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub success_rate: f64,
}

/// Completed tasks within trailing windows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    pub per_minute: usize,
    pub per_5_minutes: usize,
}

/// Aggregate view of the agent and task population. Clients replace it
/// wholesale on receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub agents: AgentCounts,
    pub tasks: TaskCounts,
    pub throughput: Throughput,
}

impl MetricsSnapshot {
    pub fn compute<'a>(
        agents: &[Agent],
        tasks: impl IntoIterator<Item = &'a Task>,
        throughput: Throughput,
    ) -> Self {
        let mut counts = TaskCounts::default();
        for task in tasks {
            counts.total += 1;
            match task.status {
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Queued => {},
            }
        }
        let rate = counts.completed as f64 / counts.total.max(1) as f64 * 100.0;
        counts.success_rate = (rate * 10.0).round() / 10.0;

        Self {
            agents: AgentCounts {
                total: agents.len(),
                running: agents
                    .iter()
                    .filter(|a| a.status == AgentStatus::Running)
                    .count(),
                idle: agents
                    .iter()
                    .filter(|a| a.status == AgentStatus::Idle)
                    .count(),
            },
            tasks: counts,
            throughput,
        }
    }
}
