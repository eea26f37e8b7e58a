use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use workforce_core::model::{Agent, AgentStatus, AgentType, MetricsSnapshot, Task, TaskStatus};
use workforce_core::time::{Timestamp, serde_utc};

use crate::error::AppError;
use crate::executor;
use crate::state::AppState;
use crate::workforce::{DeployAgent, SubmitTask};

/// Response for a successful deploy.
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub status: AgentStatus,
    #[serde(with = "serde_utc")]
    pub created_at: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct TerminateResponse {
    pub status: &'static str,
    pub agent_id: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub agent_id: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/agents
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<Agent>> {
    Json(state.workforce.read().await.agents())
}

/// POST /api/agents/deploy
pub async fn deploy_agent(
    State(state): State<AppState>,
    Json(body): Json<DeployAgent>,
) -> Result<Json<DeployResponse>, AppError> {
    let agent = state.workforce.write().await.deploy(body)?;
    Ok(Json(DeployResponse {
        id: agent.id,
        name: agent.name,
        agent_type: agent.agent_type,
        status: agent.status,
        created_at: agent.created_at,
    }))
}

/// DELETE /api/agents/{agent_id}
pub async fn terminate_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<TerminateResponse>, AppError> {
    state
        .workforce
        .write()
        .await
        .terminate(&agent_id)
        .map_err(|_| AppError::NotFound("Agent not found".to_string()))?;
    Ok(Json(TerminateResponse {
        status: "terminated",
        agent_id,
    }))
}

/// GET /api/agents/{agent_id}/status
pub async fn agent_status(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Agent>, AppError> {
    state
        .workforce
        .read()
        .await
        .agent(&agent_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Agent not found".to_string()))
}

/// POST /api/tasks/submit: queue a task and start executing it in the
/// background.
pub async fn submit_task(
    State(state): State<AppState>,
    Json(body): Json<SubmitTask>,
) -> Result<Json<SubmitResponse>, AppError> {
    let task = state.workforce.write().await.submit(body)?;
    executor::spawn(
        Arc::clone(&state.workforce),
        task.id.clone(),
        Duration::from_millis(state.config.local.execution_delay_ms),
    );
    Ok(Json(SubmitResponse {
        task_id: task.id,
        status: task.status,
    }))
}

/// GET /api/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> Json<Vec<Task>> {
    let limits = &state.config.limits;
    let limit = query
        .limit
        .unwrap_or(limits.default_task_limit)
        .min(limits.max_task_limit);
    let agent_id = query.agent_id.as_deref().filter(|a| !a.is_empty());
    Json(state.workforce.read().await.list_tasks(agent_id, limit))
}

/// GET /api/tasks/{task_id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, AppError> {
    state
        .workforce
        .read()
        .await
        .task(&task_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))
}

/// GET /api/metrics
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.workforce.read().await.metrics())
}
