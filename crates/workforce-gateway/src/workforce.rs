use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use axum::extract::ws::Utf8Bytes;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use workforce_core::model::{
    Agent, AgentStatus, AgentType, DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY, MetricsSnapshot,
    Task, TaskStatus, Throughput,
};
use workforce_core::net::messages::PushMessage;

use crate::config::LocalConfig;
use crate::error::AppError;
use crate::hub::PushHub;

/// Completion instants kept for throughput windows.
const MAX_COMPLETION_SAMPLES: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct DeployAgent {
    pub agent_type: String,
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitTask {
    pub agent_id: String,
    pub task_type: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub priority: Option<i64>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Illegal transition for task {task_id}: {from} -> {to}")]
pub struct TransitionError {
    pub task_id: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum WorkforceError {
    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),
    #[error("Agent type '{0}' is not enabled")]
    AgentTypeDisabled(AgentType),
    #[error("Agent {0} not found")]
    AgentNotFound(String),
    #[error("Task not found")]
    TaskNotFound,
    #[error("priority must be between 1 and 10")]
    InvalidPriority(i64),
    #[error("name must not be empty")]
    EmptyName,
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl From<WorkforceError> for AppError {
    fn from(err: WorkforceError) -> Self {
        let message = err.to_string();
        match err {
            WorkforceError::UnknownAgentType(_)
            | WorkforceError::InvalidPriority(_)
            | WorkforceError::EmptyName => AppError::BadRequest(message),
            WorkforceError::AgentTypeDisabled(_) => AppError::Forbidden(message),
            WorkforceError::AgentNotFound(_) | WorkforceError::TaskNotFound => {
                AppError::NotFound(message)
            },
            WorkforceError::Transition(_) => AppError::Conflict(message),
        }
    }
}

struct AgentEntry {
    agent: Agent,
    started: Instant,
}

impl AgentEntry {
    fn snapshot(&self) -> Agent {
        let mut agent = self.agent.clone();
        let uptime = self.started.elapsed().as_secs_f64();
        agent.uptime_seconds = (uptime * 10.0).round() / 10.0;
        agent
    }
}

/// In-memory agent registry and task queue for local backend mode.
///
/// Every mutation a dashboard must observe is published to the hub from
/// inside the `&mut self` method. Callers hold the write lock around those
/// calls, so per-task push order matches transition order.
pub struct Workforce {
    agents: Vec<AgentEntry>,
    tasks: HashMap<String, Task>,
    /// Task ids in submission order, oldest first.
    order: VecDeque<String>,
    completions: VecDeque<Instant>,
    hub: PushHub,
    allowed_agent_types: Vec<AgentType>,
    max_stored_tasks: usize,
}

fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

impl Workforce {
    pub fn new(config: &LocalConfig, hub: PushHub) -> Self {
        Self {
            agents: Vec::new(),
            tasks: HashMap::new(),
            order: VecDeque::new(),
            completions: VecDeque::new(),
            hub,
            allowed_agent_types: config.allowed_agent_types.clone(),
            max_stored_tasks: config.max_stored_tasks.max(1),
        }
    }

    pub fn hub(&self) -> &PushHub {
        &self.hub
    }

    pub fn agents(&self) -> Vec<Agent> {
        self.agents.iter().map(AgentEntry::snapshot).collect()
    }

    pub fn agent(&self, id: &str) -> Option<Agent> {
        self.agents
            .iter()
            .find(|e| e.agent.id == id)
            .map(AgentEntry::snapshot)
    }

    fn agent_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents
            .iter_mut()
            .find(|e| e.agent.id == id)
            .map(|e| &mut e.agent)
    }

    pub fn deploy(&mut self, req: DeployAgent) -> Result<Agent, WorkforceError> {
        let agent_type = AgentType::parse(&req.agent_type)
            .ok_or_else(|| WorkforceError::UnknownAgentType(req.agent_type.clone()))?;
        if !self.allowed_agent_types.contains(&agent_type) {
            return Err(WorkforceError::AgentTypeDisabled(agent_type));
        }
        let name = req.name.trim();
        if name.is_empty() {
            return Err(WorkforceError::EmptyName);
        }

        let agent = Agent {
            id: short_id(),
            name: name.to_string(),
            agent_type,
            description: req
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| agent_type.default_description().to_string()),
            status: AgentStatus::Running,
            config: req.config,
            created_at: workforce_core::time::now(),
            uptime_seconds: 0.0,
            tasks_completed: 0,
            tasks_failed: 0,
            current_task: None,
        };
        self.agents.push(AgentEntry {
            agent: agent.clone(),
            started: Instant::now(),
        });
        tracing::info!(agent_id = %agent.id, agent_type = %agent_type, "Agent deployed");
        self.publish_agents();
        Ok(agent)
    }

    /// Remove an agent from the registry. Its queued tasks fail when the
    /// executor picks them up.
    pub fn terminate(&mut self, id: &str) -> Result<(), WorkforceError> {
        let pos = self
            .agents
            .iter()
            .position(|e| e.agent.id == id)
            .ok_or_else(|| WorkforceError::AgentNotFound(id.to_string()))?;
        self.agents.remove(pos);
        tracing::info!(agent_id = %id, "Agent terminated");
        self.publish_agents();
        Ok(())
    }

    pub fn submit(&mut self, req: SubmitTask) -> Result<Task, WorkforceError> {
        if self.agent_mut(&req.agent_id).is_none() {
            return Err(WorkforceError::AgentNotFound(req.agent_id));
        }
        let priority = match req.priority {
            None => DEFAULT_PRIORITY,
            Some(p) => u8::try_from(p)
                .ok()
                .filter(|p| (MIN_PRIORITY..=MAX_PRIORITY).contains(p))
                .ok_or(WorkforceError::InvalidPriority(p))?,
        };

        let task = Task {
            id: short_id(),
            agent_id: req.agent_id,
            task_type: req.task_type,
            payload: req.payload,
            priority,
            status: TaskStatus::Queued,
            created_at: workforce_core::time::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        };
        self.order.push_back(task.id.clone());
        self.tasks.insert(task.id.clone(), task.clone());
        self.evict();
        tracing::debug!(task_id = %task.id, agent_id = %task.agent_id, "Task queued");
        Ok(task)
    }

    /// Drop the oldest terminal tasks beyond the storage bound. Active tasks
    /// are never evicted.
    fn evict(&mut self) {
        while self.order.len() > self.max_stored_tasks {
            let tasks = &self.tasks;
            let Some(pos) = self
                .order
                .iter()
                .position(|id| tasks.get(id).is_none_or(|t| t.status.is_terminal()))
            else {
                break;
            };
            if let Some(id) = self.order.remove(pos) {
                self.tasks.remove(&id);
            }
        }
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).cloned()
    }

    /// Tasks newest first, optionally filtered by agent.
    pub fn list_tasks(&self, agent_id: Option<&str>, limit: usize) -> Vec<Task> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| agent_id.is_none_or(|a| t.agent_id == a))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Move a task along its lifecycle and publish the result.
    ///
    /// `running` stamps `started_at` and marks the agent busy. A terminal
    /// status stamps `finished_at`, updates the agent's counters, and is
    /// followed by `metrics_update` and `agents_update`.
    pub fn transition(
        &mut self,
        task_id: &str,
        next: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Task, WorkforceError> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or(WorkforceError::TaskNotFound)?;
        if !task.status.can_transition_to(next) {
            return Err(TransitionError {
                task_id: task_id.to_string(),
                from: task.status,
                to: next,
            }
            .into());
        }

        let now = workforce_core::time::now();
        task.status = next;
        match next {
            TaskStatus::Running => task.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed => task.finished_at = Some(now),
            TaskStatus::Queued => {},
        }
        if result.is_some() {
            task.result = result;
        }
        if error.is_some() {
            task.error = error;
        }
        let task = task.clone();

        if next == TaskStatus::Completed {
            self.completions.push_back(Instant::now());
            while self.completions.len() > MAX_COMPLETION_SAMPLES {
                self.completions.pop_front();
            }
        }
        if let Some(agent) = self.agent_mut(&task.agent_id) {
            match next {
                TaskStatus::Running => agent.current_task = Some(task.id.clone()),
                TaskStatus::Completed => {
                    agent.tasks_completed += 1;
                    agent.current_task = None;
                },
                TaskStatus::Failed => {
                    agent.tasks_failed += 1;
                    agent.current_task = None;
                },
                TaskStatus::Queued => {},
            }
        }

        tracing::debug!(task_id = %task.id, status = %next, "Task transitioned");
        self.hub.publish(&PushMessage::TaskUpdate {
            task: Box::new(task.clone()),
        });
        if next.is_terminal() {
            self.hub.publish(&PushMessage::MetricsUpdate {
                metrics: Some(self.metrics()),
            });
            self.publish_agents();
        }
        Ok(task)
    }

    pub fn throughput(&self) -> Throughput {
        let count_within = |window: Duration| {
            self.completions
                .iter()
                .filter(|at| at.elapsed() < window)
                .count()
        };
        Throughput {
            per_minute: count_within(Duration::from_secs(60)),
            per_5_minutes: count_within(Duration::from_secs(300)),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::compute(&self.agents(), self.tasks.values(), self.throughput())
    }

    /// Subscribe to the hub and build the `init` snapshot in one step. With
    /// the read lock held no mutation can slip between the two.
    pub fn subscribe_with_init(&self, task_limit: usize) -> (broadcast::Receiver<Utf8Bytes>, PushMessage) {
        let rx = self.hub.subscribe();
        let init = PushMessage::Init {
            agents: self.agents(),
            tasks: self.list_tasks(None, task_limit),
            metrics: Some(self.metrics()),
        };
        (rx, init)
    }

    fn publish_agents(&self) {
        self.hub.publish(&PushMessage::AgentsUpdate {
            agents: self.agents(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workforce_core::net::protocol::decode_push_message;

    fn workforce() -> Workforce {
        Workforce::new(&LocalConfig::default(), PushHub::new(64))
    }

    fn deploy(wf: &mut Workforce, agent_type: &str) -> Agent {
        wf.deploy(DeployAgent {
            agent_type: agent_type.to_string(),
            name: "Ada".to_string(),
            config: Map::new(),
            description: None,
        })
        .unwrap()
    }

    fn submit(wf: &mut Workforce, agent_id: &str, priority: Option<i64>) -> Result<Task, WorkforceError> {
        wf.submit(SubmitTask {
            agent_id: agent_id.to_string(),
            task_type: "review_pr".to_string(),
            payload: Map::new(),
            priority,
        })
    }

    fn drain_tags(rx: &mut broadcast::Receiver<Utf8Bytes>) -> Vec<&'static str> {
        let mut tags = Vec::new();
        while let Ok(text) = rx.try_recv() {
            tags.push(decode_push_message(text.as_str()).unwrap().tag());
        }
        tags
    }

    #[test]
    fn deploy_validates_type() {
        let mut wf = Workforce::new(
            &LocalConfig {
                allowed_agent_types: vec![AgentType::SoftwareEngineer],
                ..LocalConfig::default()
            },
            PushHub::new(8),
        );
        let err = wf
            .deploy(DeployAgent {
                agent_type: "janitor".to_string(),
                name: "x".to_string(),
                config: Map::new(),
                description: None,
            })
            .unwrap_err();
        assert_eq!(err, WorkforceError::UnknownAgentType("janitor".to_string()));

        let err = wf
            .deploy(DeployAgent {
                agent_type: "data_entry".to_string(),
                name: "x".to_string(),
                config: Map::new(),
                description: None,
            })
            .unwrap_err();
        assert_eq!(err, WorkforceError::AgentTypeDisabled(AgentType::DataEntry));

        let agent = deploy(&mut wf, "software_engineer");
        assert_eq!(agent.status, AgentStatus::Running);
        assert_eq!(agent.id.len(), 8);
        assert_eq!(wf.agents().len(), 1);
    }

    #[test]
    fn deploy_and_terminate_publish_agents_update() {
        let mut wf = workforce();
        let mut rx = wf.hub().subscribe();
        let agent = deploy(&mut wf, "data_entry");
        wf.terminate(&agent.id).unwrap();
        assert_eq!(drain_tags(&mut rx), vec!["agents_update", "agents_update"]);
        assert!(wf.agents().is_empty());
        assert_eq!(
            wf.terminate(&agent.id),
            Err(WorkforceError::AgentNotFound(agent.id.clone()))
        );
    }

    #[test]
    fn submit_checks_agent_and_priority() {
        let mut wf = workforce();
        assert!(matches!(
            submit(&mut wf, "ghost", None),
            Err(WorkforceError::AgentNotFound(_))
        ));

        let agent = deploy(&mut wf, "software_engineer");
        assert_eq!(
            submit(&mut wf, &agent.id, Some(0)),
            Err(WorkforceError::InvalidPriority(0))
        );
        assert_eq!(
            submit(&mut wf, &agent.id, Some(11)),
            Err(WorkforceError::InvalidPriority(11))
        );
        let task = submit(&mut wf, &agent.id, None).unwrap();
        assert_eq!(task.priority, DEFAULT_PRIORITY);
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(submit(&mut wf, &agent.id, Some(10)).unwrap().priority, 10);
    }

    #[test]
    fn transitions_are_enforced() {
        let mut wf = workforce();
        let agent = deploy(&mut wf, "software_engineer");
        let task = submit(&mut wf, &agent.id, None).unwrap();

        let err = wf
            .transition(&task.id, TaskStatus::Completed, None, None)
            .unwrap_err();
        assert!(matches!(err, WorkforceError::Transition(_)));

        let running = wf
            .transition(&task.id, TaskStatus::Running, None, None)
            .unwrap();
        assert!(running.started_at.is_some());
        assert_eq!(wf.agent(&agent.id).unwrap().current_task, Some(task.id.clone()));

        let done = wf
            .transition(
                &task.id,
                TaskStatus::Completed,
                Some(serde_json::json!("ok")),
                None,
            )
            .unwrap();
        assert!(done.finished_at.is_some());
        assert_eq!(done.result, Some(serde_json::json!("ok")));

        assert!(
            wf.transition(&task.id, TaskStatus::Running, None, None)
                .is_err()
        );
        let agent = wf.agent(&agent.id).unwrap();
        assert_eq!(agent.tasks_completed, 1);
        assert_eq!(agent.current_task, None);
        assert_eq!(wf.throughput().per_minute, 1);
    }

    #[test]
    fn terminal_transition_publishes_in_order() {
        let mut wf = workforce();
        let agent = deploy(&mut wf, "software_engineer");
        let task = submit(&mut wf, &agent.id, None).unwrap();
        let mut rx = wf.hub().subscribe();

        wf.transition(&task.id, TaskStatus::Running, None, None)
            .unwrap();
        wf.transition(&task.id, TaskStatus::Failed, None, Some("boom".to_string()))
            .unwrap();
        assert_eq!(
            drain_tags(&mut rx),
            vec!["task_update", "task_update", "metrics_update", "agents_update"]
        );
        assert_eq!(wf.agent(&agent.id).unwrap().tasks_failed, 1);
    }

    #[test]
    fn list_tasks_newest_first_with_filter() {
        let mut wf = workforce();
        let a = deploy(&mut wf, "software_engineer");
        let b = deploy(&mut wf, "software_engineer");
        let t1 = submit(&mut wf, &a.id, None).unwrap();
        let t2 = submit(&mut wf, &b.id, None).unwrap();
        let t3 = submit(&mut wf, &a.id, None).unwrap();

        let all: Vec<_> = wf.list_tasks(None, 50).into_iter().map(|t| t.id).collect();
        assert_eq!(all, vec![t3.id.clone(), t2.id.clone(), t1.id.clone()]);

        let only_a: Vec<_> = wf
            .list_tasks(Some(&a.id), 50)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(only_a, vec![t3.id.clone(), t1.id]);
        assert_eq!(wf.list_tasks(None, 1)[0].id, t3.id);
    }

    #[test]
    fn eviction_keeps_active_tasks() {
        let mut wf = Workforce::new(
            &LocalConfig {
                max_stored_tasks: 2,
                ..LocalConfig::default()
            },
            PushHub::new(64),
        );
        let agent = deploy(&mut wf, "software_engineer");
        let first = submit(&mut wf, &agent.id, None).unwrap();
        wf.transition(&first.id, TaskStatus::Running, None, None)
            .unwrap();
        wf.transition(&first.id, TaskStatus::Completed, None, None)
            .unwrap();
        let second = submit(&mut wf, &agent.id, None).unwrap();
        let third = submit(&mut wf, &agent.id, None).unwrap();

        assert!(wf.task(&first.id).is_none());
        assert!(wf.task(&second.id).is_some());
        assert!(wf.task(&third.id).is_some());

        // Nothing terminal left to evict: the queue may exceed the bound.
        let fourth = submit(&mut wf, &agent.id, None).unwrap();
        assert!(wf.task(&fourth.id).is_some());
        assert_eq!(wf.list_tasks(None, 50).len(), 3);
    }

    #[test]
    fn init_snapshot_limits_tasks() {
        let mut wf = workforce();
        let agent = deploy(&mut wf, "software_engineer");
        for _ in 0..5 {
            submit(&mut wf, &agent.id, None).unwrap();
        }
        let (_rx, init) = wf.subscribe_with_init(3);
        match init {
            PushMessage::Init {
                agents,
                tasks,
                metrics,
            } => {
                assert_eq!(agents.len(), 1);
                assert_eq!(tasks.len(), 3);
                assert_eq!(metrics.unwrap().tasks.total, 5);
            },
            other => panic!("expected init, got {other:?}"),
        }
    }

    #[test]
    fn workforce_errors_map_to_http_status() {
        use axum::http::StatusCode;
        let status = |e: WorkforceError| AppError::from(e).status();
        assert_eq!(
            status(WorkforceError::UnknownAgentType("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(WorkforceError::AgentTypeDisabled(AgentType::DataEntry)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status(WorkforceError::TaskNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(WorkforceError::InvalidPriority(0)), StatusCode::BAD_REQUEST);
    }
}
