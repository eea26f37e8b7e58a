use std::time::Duration;

use serde_json::{Value, json};

use workforce_core::model::{AgentType, Task, TaskStatus};

use crate::state::SharedWorkforce;

/// Simulated work for a task type the agent supports. Returns a structured
/// result, or the failure message for task types outside its catalog.
pub fn simulate(agent_type: AgentType, task: &Task) -> Result<Value, String> {
    if !agent_type.supports(&task.task_type) {
        return Err(format!("Unknown task type: {}", task.task_type));
    }
    let mut input_fields: Vec<&str> = task.payload.keys().map(String::as_str).collect();
    input_fields.sort_unstable();
    Ok(json!({
        "task_type": task.task_type,
        "agent_type": agent_type.as_str(),
        "status": "success",
        "summary": format!("{} finished for {} input field(s)", task.task_type, input_fields.len()),
        "input_fields": input_fields,
    }))
}

/// Run a queued task to completion: wait `delay`, move it to `running`,
/// simulate execution, then record the outcome. Each transition happens under
/// the workforce write lock so its push message is ordered.
pub async fn run_task(workforce: SharedWorkforce, task_id: String, delay: Duration) {
    tokio::time::sleep(delay).await;

    let (task, agent_type) = {
        let mut wf = workforce.write().await;
        let task = match wf.transition(&task_id, TaskStatus::Running, None, None) {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Task could not start");
                return;
            },
        };
        let agent_type = wf.agent(&task.agent_id).map(|a| a.agent_type);
        (task, agent_type)
    };

    let outcome = match agent_type {
        Some(agent_type) => {
            tokio::time::sleep(delay).await;
            simulate(agent_type, &task)
        },
        None => Err("Agent terminated".to_string()),
    };

    let mut wf = workforce.write().await;
    let finished = match outcome {
        Ok(result) => wf.transition(&task_id, TaskStatus::Completed, Some(result), None),
        Err(error) => {
            tracing::info!(task_id = %task_id, error = %error, "Task failed");
            wf.transition(&task_id, TaskStatus::Failed, None, Some(error))
        },
    };
    if let Err(e) = finished {
        tracing::warn!(task_id = %task_id, error = %e, "Task could not finish");
    }
}

/// Spawn `run_task` in the background.
pub fn spawn(workforce: SharedWorkforce, task_id: String, delay: Duration) {
    tokio::spawn(run_task(workforce, task_id, delay));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Map;
    use tokio::sync::RwLock;

    use super::*;
    use crate::config::LocalConfig;
    use crate::hub::PushHub;
    use crate::workforce::{DeployAgent, SubmitTask, Workforce};

    fn task_of(task_type: &str) -> Task {
        let mut task = workforce_core::test_helpers::make_task("t-1", "a-1", TaskStatus::Running);
        task.task_type = task_type.to_string();
        task.payload.insert("code".to_string(), json!("fn main() {}"));
        task
    }

    #[test]
    fn simulate_known_task_type() {
        let result = simulate(AgentType::SoftwareEngineer, &task_of("review_pr")).unwrap();
        assert_eq!(result["status"], "success");
        assert_eq!(result["agent_type"], "software_engineer");
        assert_eq!(result["input_fields"][0], "code");
    }

    #[test]
    fn simulate_unknown_task_type() {
        let err = simulate(AgentType::DataEntry, &task_of("review_pr")).unwrap_err();
        assert_eq!(err, "Unknown task type: review_pr");
    }

    async fn setup(task_type: &str) -> (SharedWorkforce, String, String) {
        let mut wf = Workforce::new(&LocalConfig::default(), PushHub::new(64));
        let agent = wf
            .deploy(DeployAgent {
                agent_type: "software_engineer".to_string(),
                name: "Ada".to_string(),
                config: Map::new(),
                description: None,
            })
            .unwrap();
        let task = wf
            .submit(SubmitTask {
                agent_id: agent.id.clone(),
                task_type: task_type.to_string(),
                payload: Map::new(),
                priority: None,
            })
            .unwrap();
        (Arc::new(RwLock::new(wf)), agent.id, task.id)
    }

    #[tokio::test]
    async fn run_task_completes_supported_type() {
        let (wf, _agent_id, task_id) = setup("write_tests").await;
        run_task(Arc::clone(&wf), task_id.clone(), Duration::ZERO).await;
        let task = wf.read().await.task(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.result.is_some());
        assert!(task.error.is_none());
    }

    #[tokio::test]
    async fn run_task_fails_unknown_type() {
        let (wf, agent_id, task_id) = setup("triage_ticket").await;
        run_task(Arc::clone(&wf), task_id.clone(), Duration::ZERO).await;
        let wf = wf.read().await;
        let task = wf.task(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("Unknown task type: triage_ticket"));
        assert_eq!(wf.agent(&agent_id).unwrap().tasks_failed, 1);
    }

    #[tokio::test]
    async fn run_task_fails_when_agent_terminated() {
        let (wf, agent_id, task_id) = setup("review_pr").await;
        wf.write().await.terminate(&agent_id).unwrap();
        run_task(Arc::clone(&wf), task_id.clone(), Duration::ZERO).await;
        let task = wf.read().await.task(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("Agent terminated"));
    }
}
