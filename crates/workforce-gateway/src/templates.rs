use axum::Json;
use serde::Serialize;
use serde_json::{Value, json};

use workforce_core::model::AgentType;

/// A preset deployment the dashboard offers in its deploy dialog.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub agent_type: AgentType,
    pub config: Value,
    pub estimated_tasks_per_day: u32,
}

pub fn catalog() -> Vec<DeploymentTemplate> {
    vec![
        DeploymentTemplate {
            id: "tpl-cs-basic",
            name: "Customer Support Starter",
            description: "Handles ticket triage, sentiment analysis, and response drafting",
            agent_type: AgentType::CustomerSupport,
            config: json!({
                "categories": ["billing", "technical", "general"],
                "auto_resolve_threshold": 0.85,
            }),
            estimated_tasks_per_day: 200,
        },
        DeploymentTemplate {
            id: "tpl-de-invoice",
            name: "Invoice Processor",
            description: "Extracts and validates data from invoices and receipts",
            agent_type: AgentType::DataEntry,
            config: json!({
                "document_types": ["invoice", "receipt"],
                "output_format": "json",
            }),
            estimated_tasks_per_day: 500,
        },
        DeploymentTemplate {
            id: "tpl-swe-review",
            name: "Code Review Bot",
            description: "Reviews PRs, detects bugs, and suggests improvements",
            agent_type: AgentType::SoftwareEngineer,
            config: json!({
                "languages": ["python", "typescript"],
                "test_coverage_target": 80,
            }),
            estimated_tasks_per_day: 50,
        },
        DeploymentTemplate {
            id: "tpl-de-crm",
            name: "CRM Data Enricher",
            description: "Enriches CRM records with company and contact data",
            agent_type: AgentType::DataEntry,
            config: json!({
                "enrichment_sources": ["company_db", "geo_api"],
                "output_format": "json",
            }),
            estimated_tasks_per_day: 1000,
        },
    ]
}

/// GET /api/workforce/templates
pub async fn list_templates() -> Json<Vec<DeploymentTemplate>> {
    Json(catalog())
}
