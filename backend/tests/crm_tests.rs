//! End-to-end tests for the admin CRM.
//!
//! Requires a running backend; see `site_api_tests.rs` for the environment.

mod common;

use common::{fixtures, test_id, TestServer};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
#[ignore]
async fn test_company_detail_counts_related_records() {
    let server = TestServer::new();
    let id = test_id();
    let company_id = server.create("/api/crm/companies", &fixtures::company(&id)).await;

    server
        .create(
            "/api/crm/contacts",
            &json!({
                "company_id": company_id,
                "first_name": "Katherine",
                "last_name": "Johnson",
                "email": format!("kj+{}@example.com", id),
            }),
        )
        .await;
    server
        .create(
            "/api/crm/deals",
            &fixtures::deal(&company_id, "RevOps audit", 2_500_000, "lead"),
        )
        .await;

    let (status, detail) = server
        .admin_get(&format!("/api/crm/companies/{}", company_id))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", detail);
    assert_eq!(detail["contact_count"], 1);
    assert_eq!(detail["deal_count"], 1);
    assert_eq!(detail["project_count"], 0);
}

#[tokio::test]
#[ignore]
async fn test_deal_closed_at_follows_stage() {
    let server = TestServer::new();
    let company_id = server
        .create("/api/crm/companies", &fixtures::company(&test_id()))
        .await;
    let deal_id = server
        .create(
            "/api/crm/deals",
            &fixtures::deal(&company_id, "Pipeline rebuild", 1_200_000, "proposal"),
        )
        .await;
    let path = format!("/api/crm/deals/{}", deal_id);

    let (status, won) = server.admin_patch(&path, &json!({ "stage": "won" })).await;
    assert_eq!(status, StatusCode::OK, "{}", won);
    assert!(won["closed_at"].is_string());

    let (_, reopened) = server
        .admin_patch(&path, &json!({ "stage": "negotiation" }))
        .await;
    assert!(reopened["closed_at"].is_null());
}

#[tokio::test]
#[ignore]
async fn test_pipeline_lists_every_stage() {
    let server = TestServer::new();
    let company_id = server
        .create("/api/crm/companies", &fixtures::company(&test_id()))
        .await;
    server
        .create(
            "/api/crm/deals",
            &fixtures::deal(&company_id, "Forecast cleanup", 400_000, "negotiation"),
        )
        .await;

    let (status, pipeline) = server.admin_get("/api/crm/pipeline").await;
    assert_eq!(status, StatusCode::OK);
    let stages = pipeline["stages"].as_array().expect("stages");
    assert_eq!(stages.len(), 6);
    let negotiation = stages
        .iter()
        .find(|s| s["stage"] == "negotiation")
        .expect("negotiation stage");
    assert!(negotiation["count"].as_i64().unwrap_or_default() >= 1);
    assert!(pipeline["open_value_cents"].as_i64().unwrap_or_default() >= 400_000);
}

#[tokio::test]
#[ignore]
async fn test_deleting_company_keeps_its_deals() {
    let server = TestServer::new();
    let company_id = server
        .create("/api/crm/companies", &fixtures::company(&test_id()))
        .await;
    let deal_id = server
        .create(
            "/api/crm/deals",
            &fixtures::deal(&company_id, "Orphaned deal", 100_000, "lead"),
        )
        .await;

    let (status, _) = server
        .admin_delete(&format!("/api/crm/companies/{}", company_id))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, deal) = server.admin_get(&format!("/api/crm/deals/{}", deal_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(deal["company_id"].is_null());
}

#[tokio::test]
#[ignore]
async fn test_crm_task_completion_timestamp() {
    let server = TestServer::new();
    let project_id = server
        .create(
            "/api/crm/projects",
            &json!({ "name": format!("Onboarding {}", test_id()) }),
        )
        .await;
    let task_id = server
        .create(
            "/api/crm/tasks",
            &json!({ "project_id": project_id, "title": "Map lifecycle stages" }),
        )
        .await;

    let (status, done) = server
        .admin_patch(
            &format!("/api/crm/tasks/{}", task_id),
            &json!({ "status": "done" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", done);
    assert!(done["completed_at"].is_string());

    // Tasks go with their project.
    server
        .admin_delete(&format!("/api/crm/projects/{}", project_id))
        .await;
    let (status, _) = server
        .admin_get(&format!("/api/crm/tasks/{}", task_id))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
