#[allow(dead_code)]
mod common;

use std::time::Duration;

use common::{TestServer, demo_token, deploy_agent, submit_task, test_config};
use workforce_core::model::AgentType;
use workforce_gateway::config::{GatewayConfig, LimitsConfig, LocalConfig};

async fn wait_for_status(server: &TestServer, token: &str, task_id: &str, status: &str) -> serde_json::Value {
    let client = reqwest::Client::new();
    for _ in 0..100 {
        let task: serde_json::Value = client
            .get(server.url(&format!("/api/tasks/{task_id}")))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if task["status"] == status {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {task_id} never reached {status}");
}

#[tokio::test]
async fn deploy_list_and_status() {
    let server = TestServer::new().await;
    let token = demo_token(&server).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/agents/deploy"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "agent_type": "data_entry", "name": "Ingest" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let deployed: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(deployed["type"], "data_entry");
    assert_eq!(deployed["status"], "running");
    assert_eq!(deployed["id"].as_str().unwrap().len(), 8);

    let agents: serde_json::Value = client
        .get(server.url("/api/agents"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(agents.as_array().unwrap().len(), 1);
    assert_eq!(agents[0]["name"], "Ingest");

    let id = deployed["id"].as_str().unwrap();
    let status: serde_json::Value = client
        .get(server.url(&format!("/api/agents/{id}/status")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["id"], id);
    assert!(status["description"].as_str().is_some_and(|d| !d.is_empty()));
}

#[tokio::test]
async fn deploy_rejects_unknown_and_disabled_types() {
    let config = GatewayConfig {
        local: LocalConfig {
            allowed_agent_types: vec![AgentType::SoftwareEngineer],
            ..test_config().local
        },
        ..test_config()
    };
    let server = TestServer::from_config(config).await;
    let token = demo_token(&server).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/agents/deploy"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "agent_type": "astronaut", "name": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Unknown agent type: astronaut");

    let resp = client
        .post(server.url("/api/agents/deploy"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "agent_type": "data_entry", "name": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Agent type 'data_entry' is not enabled");
}

#[tokio::test]
async fn terminate_unknown_agent_is_not_found() {
    let server = TestServer::new().await;
    let token = demo_token(&server).await;
    let client = reqwest::Client::new();

    let resp = client
        .delete(server.url("/api/agents/nope"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Agent not found");

    let id = deploy_agent(&server, &token, "customer_support").await;
    let resp = client
        .delete(server.url(&format!("/api/agents/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "terminated");
    assert_eq!(body["agent_id"], id.as_str());

    let resp = client
        .get(server.url(&format!("/api/agents/{id}/status")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn submit_validates_agent_and_priority() {
    let server = TestServer::new().await;
    let token = demo_token(&server).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/tasks/submit"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "agent_id": "ghost", "task_type": "generate_code" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let agent = deploy_agent(&server, &token, "software_engineer").await;
    let resp = client
        .post(server.url("/api/tasks/submit"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "agent_id": agent,
            "task_type": "generate_code",
            "priority": 11,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn submitted_task_completes() {
    let server = TestServer::new().await;
    let token = demo_token(&server).await;
    let agent = deploy_agent(&server, &token, "software_engineer").await;
    let task_id = submit_task(&server, &token, &agent, "generate_code").await;

    let task = wait_for_status(&server, &token, &task_id, "completed").await;
    assert_eq!(task["type"], "generate_code");
    assert_eq!(task["result"]["status"], "success");
    assert!(task["started_at"].is_string());
    assert!(task["finished_at"].is_string());
    assert!(task["error"].is_null());

    let status: serde_json::Value = reqwest::Client::new()
        .get(server.url(&format!("/api/agents/{agent}/status")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["tasks_completed"], 1);
}

#[tokio::test]
async fn unsupported_task_type_fails() {
    let server = TestServer::new().await;
    let token = demo_token(&server).await;
    let agent = deploy_agent(&server, &token, "data_entry").await;
    let task_id = submit_task(&server, &token, &agent, "write_poetry").await;

    let task = wait_for_status(&server, &token, &task_id, "failed").await;
    assert_eq!(task["error"], "Unknown task type: write_poetry");
}

#[tokio::test]
async fn list_tasks_filters_and_limits() {
    let server = TestServer::new().await;
    let token = demo_token(&server).await;
    let a = deploy_agent(&server, &token, "software_engineer").await;
    let b = deploy_agent(&server, &token, "software_engineer").await;
    submit_task(&server, &token, &a, "review_pr").await;
    submit_task(&server, &token, &a, "write_tests").await;
    let newest = submit_task(&server, &token, &b, "refactor").await;

    let client = reqwest::Client::new();
    let all: serde_json::Value = client
        .get(server.url("/api/tasks"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.as_array().unwrap().len(), 3);
    assert_eq!(all[0]["id"], newest.as_str());

    let filtered: serde_json::Value = client
        .get(server.url(&format!("/api/tasks?agent_id={a}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let filtered = filtered.as_array().unwrap();
    assert_eq!(filtered.len(), 2);
    assert!(filtered.iter().all(|t| t["agent_id"] == a.as_str()));

    let limited: serde_json::Value = client
        .get(server.url("/api/tasks?limit=1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(limited.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn get_unknown_task_is_not_found() {
    let server = TestServer::new().await;
    let token = demo_token(&server).await;
    let resp = reqwest::Client::new()
        .get(server.url("/api/tasks/missing"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Task not found");
}

#[tokio::test]
async fn metrics_reflect_population() {
    let server = TestServer::new().await;
    let token = demo_token(&server).await;
    let agent = deploy_agent(&server, &token, "customer_support").await;
    let task_id = submit_task(&server, &token, &agent, "triage_ticket").await;
    wait_for_status(&server, &token, &task_id, "completed").await;

    let metrics: serde_json::Value = reqwest::Client::new()
        .get(server.url("/api/metrics"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics["agents"]["total"], 1);
    assert_eq!(metrics["tasks"]["total"], 1);
    assert_eq!(metrics["tasks"]["completed"], 1);
    assert_eq!(metrics["tasks"]["success_rate"], 100.0);
    assert_eq!(metrics["throughput"]["per_minute"], 1);
}

#[tokio::test]
async fn templates_are_listed() {
    let server = TestServer::new().await;
    let token = demo_token(&server).await;
    let templates: serde_json::Value = reqwest::Client::new()
        .get(server.url("/api/workforce/templates"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let templates = templates.as_array().unwrap();
    assert_eq!(templates.len(), 4);
    assert!(templates.iter().all(|t| t["id"].is_string() && t["agent_type"].is_string()));
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::new().await;
    let resp = reqwest::get(server.url("/api/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
    assert_eq!(resp.headers()["x-frame-options"], "SAMEORIGIN");
    assert!(resp.headers().contains_key("x-request-id"));

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["services"]["gateway"], "ok");
    assert_eq!(body["services"]["agent_backend"], "ok");
    assert_eq!(body["connections"]["websocket"], 0);
    assert!(body["timestamp"].is_string());
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn unknown_api_route_is_json_404() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    for resp in [
        client.get(server.url("/api/nowhere")).send().await.unwrap(),
        client.post(server.url("/api/nowhere")).send().await.unwrap(),
    ] {
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Route not found");
    }
}

#[tokio::test]
async fn cors_preflight_allows_frontend_origin() {
    let server = TestServer::new().await;
    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, server.url("/api/agents"))
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "GET")
        .header("access-control-request-headers", "authorization")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "http://localhost:5173"
    );
}

#[tokio::test]
async fn api_rate_limit_returns_429() {
    let config = GatewayConfig {
        limits: LimitsConfig {
            api_rate_limit_burst: 3,
            api_rate_limit_per_sec: 0.001,
            ..LimitsConfig::default()
        },
        ..test_config()
    };
    let server = TestServer::from_config(config).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let resp = client.get(server.url("/api/health")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
    }
    let resp = client.get(server.url("/api/health")).send().await.unwrap();
    assert_eq!(resp.status(), 429);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Too many requests, please try again later.");
}
