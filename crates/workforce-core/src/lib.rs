pub mod model;
pub mod net;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use serde_json::Map;

    use crate::model::{Agent, AgentStatus, AgentType, DEFAULT_PRIORITY, Task, TaskStatus};

    /// Create a running software-engineer agent with the given id.
    pub fn make_agent(id: &str) -> Agent {
        Agent {
            id: id.to_string(),
            name: format!("Agent {id}"),
            agent_type: AgentType::SoftwareEngineer,
            description: AgentType::SoftwareEngineer.default_description().to_string(),
            status: AgentStatus::Running,
            config: Map::new(),
            created_at: crate::time::now(),
            uptime_seconds: 0.0,
            tasks_completed: 0,
            tasks_failed: 0,
            current_task: None,
        }
    }

    /// Create a `review_pr` task in the given status. Terminal statuses get a
    /// finish time; `Failed` also gets an error message.
    pub fn make_task(id: &str, agent_id: &str, status: TaskStatus) -> Task {
        let now = crate::time::now();
        Task {
            id: id.to_string(),
            agent_id: agent_id.to_string(),
            task_type: "review_pr".to_string(),
            payload: Map::new(),
            priority: DEFAULT_PRIORITY,
            status,
            created_at: now,
            started_at: (status != TaskStatus::Queued).then_some(now),
            finished_at: status.is_terminal().then_some(now),
            result: None,
            error: (status == TaskStatus::Failed).then(|| "boom".to_string()),
        }
    }
}
