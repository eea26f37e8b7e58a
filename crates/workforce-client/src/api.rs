use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use workforce_core::model::{Agent, AgentStatus, AgentType, MetricsSnapshot, Task, TaskStatus};
use workforce_core::time::{Timestamp, serde_utc};

/// Authenticated user as returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub org: String,
    pub role: String,
}

/// Tokens plus user, as returned by login, register, and demo login.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployRequest {
    pub agent_type: AgentType,
    pub name: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DeployRequest {
    pub fn new(agent_type: AgentType, name: impl Into<String>) -> Self {
        Self {
            agent_type,
            name: name.into(),
            config: Map::new(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub status: AgentStatus,
    #[serde(with = "serde_utc")]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub agent_id: String,
    pub task_type: String,
    pub payload: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
}

impl SubmitRequest {
    pub fn new(agent_id: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_type: task_type.into(),
            payload: Map::new(),
            priority: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub agent_type: AgentType,
    #[serde(default)]
    pub config: Value,
    pub estimated_tasks_per_day: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceHealth {
    pub gateway: String,
    pub agent_backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub status: String,
    pub timestamp: String,
    pub services: ServiceHealth,
    pub version: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("request failed ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Pull a human-readable message out of an error body (`{"error": ..}` from
/// the gateway, `{"detail": ..}` from the agent backend).
fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["error", "detail"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_owned))
}

/// Typed REST client for the gateway's `/api` surface.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is the `/api` root, e.g. `http://localhost:3001/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let resp = builder.send().await.map_err(ApiError::Transport)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(ApiError::Transport)?;
        if !status.is_success() {
            let message = error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            return Err(if status == StatusCode::UNAUTHORIZED {
                ApiError::Unauthorized(message)
            } else {
                ApiError::Status {
                    status: status.as_u16(),
                    message,
                }
            });
        }
        serde_json::from_slice(&body).map_err(ApiError::Decode)
    }

    // --- auth ---

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        self.send(self.request(Method::POST, "/auth/login", None).json(&body))
            .await
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        org_name: Option<&str>,
    ) -> Result<AuthSession, ApiError> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "orgName": org_name,
        });
        self.send(self.request(Method::POST, "/auth/register", None).json(&body))
            .await
    }

    pub async fn login_demo(&self) -> Result<AuthSession, ApiError> {
        self.send(self.request(Method::POST, "/auth/demo", None)).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let body = serde_json::json!({ "refreshToken": refresh_token });
        self.send(self.request(Method::POST, "/auth/refresh", None).json(&body))
            .await
    }

    // --- agents ---

    pub async fn list_agents(&self, token: &str) -> Result<Vec<Agent>, ApiError> {
        self.send(self.request(Method::GET, "/agents", Some(token)))
            .await
    }

    pub async fn deploy_agent(
        &self,
        token: &str,
        req: &DeployRequest,
    ) -> Result<DeployResponse, ApiError> {
        self.send(
            self.request(Method::POST, "/agents/deploy", Some(token))
                .json(req),
        )
        .await
    }

    pub async fn terminate_agent(&self, token: &str, agent_id: &str) -> Result<(), ApiError> {
        let _: Value = self
            .send(self.request(Method::DELETE, &format!("/agents/{agent_id}"), Some(token)))
            .await?;
        Ok(())
    }

    pub async fn agent_status(&self, token: &str, agent_id: &str) -> Result<Agent, ApiError> {
        self.send(self.request(
            Method::GET,
            &format!("/agents/{agent_id}/status"),
            Some(token),
        ))
        .await
    }

    // --- tasks ---

    pub async fn list_tasks(
        &self,
        token: &str,
        agent_id: Option<&str>,
    ) -> Result<Vec<Task>, ApiError> {
        let mut builder = self.request(Method::GET, "/tasks", Some(token));
        if let Some(agent_id) = agent_id {
            builder = builder.query(&[("agent_id", agent_id)]);
        }
        self.send(builder).await
    }

    pub async fn submit_task(
        &self,
        token: &str,
        req: &SubmitRequest,
    ) -> Result<SubmitResponse, ApiError> {
        self.send(
            self.request(Method::POST, "/tasks/submit", Some(token))
                .json(req),
        )
        .await
    }

    pub async fn get_task(&self, token: &str, task_id: &str) -> Result<Task, ApiError> {
        self.send(self.request(Method::GET, &format!("/tasks/{task_id}"), Some(token)))
            .await
    }

    // --- misc ---

    pub async fn metrics(&self, token: &str) -> Result<MetricsSnapshot, ApiError> {
        self.send(self.request(Method::GET, "/metrics", Some(token)))
            .await
    }

    pub async fn templates(&self, token: &str) -> Result<Vec<DeploymentTemplate>, ApiError> {
        self.send(self.request(Method::GET, "/workforce/templates", Some(token)))
            .await
    }

    pub async fn health(&self) -> Result<Health, ApiError> {
        self.send(self.request(Method::GET, "/health", None)).await
    }
}
