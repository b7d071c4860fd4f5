//! End-to-end tests for the TaskFlow board.
//!
//! Requires a running backend; see `site_api_tests.rs` for the environment.

mod common;

use common::{fixtures, test_id, TestServer};
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

async fn new_project(server: &TestServer) -> String {
    server
        .create(
            "/api/taskflow/projects",
            &json!({ "name": format!("Website relaunch {}", test_id()) }),
        )
        .await
}

async fn column(server: &TestServer, project_id: &str, status: &str) -> Vec<Value> {
    let (code, board) = server
        .admin_get(&format!("/api/taskflow/board?project_id={}", project_id))
        .await;
    assert_eq!(code, StatusCode::OK, "{}", board);
    board["columns"]
        .as_array()
        .expect("columns")
        .iter()
        .find(|c| c["status"] == status)
        .and_then(|c| c["tasks"].as_array().cloned())
        .unwrap_or_default()
}

fn ids(tasks: &[Value]) -> Vec<String> {
    tasks
        .iter()
        .filter_map(|t| t["id"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
#[ignore]
async fn test_new_tasks_append_to_column() {
    let server = TestServer::new();
    let project = new_project(&server).await;

    let mut created = Vec::new();
    for title in ["Wireframes", "Copy", "QA"] {
        created.push(
            server
                .create(
                    "/api/taskflow/tasks",
                    &fixtures::tf_task(Some(&project), title, "todo"),
                )
                .await,
        );
    }

    let todo = column(&server, &project, "todo").await;
    assert_eq!(ids(&todo), created);
    let orders: Vec<i64> = todo.iter().filter_map(|t| t["order"].as_i64()).collect();
    assert_eq!(orders, vec![0, 1, 2]);
}

#[tokio::test]
#[ignore]
async fn test_move_within_and_across_columns() {
    let server = TestServer::new();
    let project = new_project(&server).await;

    let a = server
        .create("/api/taskflow/tasks", &fixtures::tf_task(Some(&project), "A", "todo"))
        .await;
    let b = server
        .create("/api/taskflow/tasks", &fixtures::tf_task(Some(&project), "B", "todo"))
        .await;
    let c = server
        .create("/api/taskflow/tasks", &fixtures::tf_task(Some(&project), "C", "todo"))
        .await;

    let (status, moved) = server
        .admin_post(
            &format!("/api/taskflow/tasks/{}/move", c),
            &json!({ "status": "todo", "order": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", moved);
    assert_eq!(
        ids(&column(&server, &project, "todo").await),
        vec![c.clone(), a.clone(), b.clone()]
    );

    let (status, done) = server
        .admin_post(
            &format!("/api/taskflow/tasks/{}/move", a),
            &json!({ "status": "done", "order": 99 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["order"], 0);
    assert!(done["completed_at"].is_string());

    let todo = column(&server, &project, "todo").await;
    assert_eq!(ids(&todo), vec![c, b]);
    let orders: Vec<i64> = todo.iter().filter_map(|t| t["order"].as_i64()).collect();
    assert_eq!(orders, vec![0, 1]);
}

#[tokio::test]
#[ignore]
async fn test_reorder_column() {
    let server = TestServer::new();
    let project = new_project(&server).await;

    let mut created = Vec::new();
    for title in ["One", "Two", "Three"] {
        created.push(
            server
                .create(
                    "/api/taskflow/tasks",
                    &fixtures::tf_task(Some(&project), title, "backlog"),
                )
                .await,
        );
    }
    created.reverse();

    let (status, body) = server
        .admin_post(
            "/api/taskflow/tasks/reorder",
            &json!({ "status": "backlog", "task_ids": created }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(ids(&column(&server, &project, "backlog").await), created);
}

#[tokio::test]
#[ignore]
async fn test_partial_reorder_keeps_column_dense() {
    let server = TestServer::new();
    let project = new_project(&server).await;

    let mut created = Vec::new();
    for title in ["First", "Second", "Third"] {
        created.push(
            server
                .create("/api/taskflow/tasks", &fixtures::tf_task(Some(&project), title, "todo"))
                .await,
        );
    }

    let (status, body) = server
        .admin_post(
            "/api/taskflow/tasks/reorder",
            &json!({ "status": "todo", "task_ids": [created[2]] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let todo = column(&server, &project, "todo").await;
    assert_eq!(
        ids(&todo),
        vec![created[2].clone(), created[0].clone(), created[1].clone()]
    );
    let orders: Vec<i64> = todo.iter().filter_map(|t| t["order"].as_i64()).collect();
    assert_eq!(orders, vec![0, 1, 2]);
}

#[tokio::test]
#[ignore]
async fn test_reorder_rejects_tasks_from_two_projects() {
    let server = TestServer::new();
    let first = new_project(&server).await;
    let second = new_project(&server).await;

    let a0 = server
        .create("/api/taskflow/tasks", &fixtures::tf_task(Some(&first), "a0", "todo"))
        .await;
    let a1 = server
        .create("/api/taskflow/tasks", &fixtures::tf_task(Some(&first), "a1", "todo"))
        .await;
    let b0 = server
        .create("/api/taskflow/tasks", &fixtures::tf_task(Some(&second), "b0", "todo"))
        .await;
    let b1 = server
        .create("/api/taskflow/tasks", &fixtures::tf_task(Some(&second), "b1", "todo"))
        .await;

    let (status, body) = server
        .admin_post(
            "/api/taskflow/tasks/reorder",
            &json!({ "status": "todo", "task_ids": [b1, a1] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    assert_eq!(ids(&column(&server, &first, "todo").await), vec![a0, a1]);
    assert_eq!(ids(&column(&server, &second, "todo").await), vec![b0, b1]);
}

#[tokio::test]
#[ignore]
async fn test_rejected_update_saves_nothing() {
    let server = TestServer::new();
    let project = new_project(&server).await;
    let task = server
        .create("/api/taskflow/tasks", &fixtures::tf_task(Some(&project), "Original", "todo"))
        .await;

    let (status, body) = server
        .admin_patch(
            &format!("/api/taskflow/tasks/{}", task),
            &json!({ "title": "Renamed", "project_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (status, stored) = server
        .admin_get(&format!("/api/taskflow/tasks/{}", task))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["title"], "Original");
    assert_eq!(stored["project_id"], project.as_str());
}

#[tokio::test]
#[ignore]
async fn test_deleting_project_detaches_tasks() {
    let server = TestServer::new();
    let project = new_project(&server).await;
    let task = server
        .create(
            "/api/taskflow/tasks",
            &fixtures::tf_task(Some(&project), "Survives", "review"),
        )
        .await;

    let (status, _) = server
        .admin_delete(&format!("/api/taskflow/projects/{}", project))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .admin_get(&format!("/api/taskflow/tasks/{}", task))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["project_id"].is_null());

    let (_, activity) = server
        .admin_get(&format!("/api/taskflow/activity?project_id={}", project))
        .await;
    let actions: Vec<&str> = activity
        .as_array()
        .expect("activity")
        .iter()
        .filter_map(|a| a["action"].as_str())
        .collect();
    assert!(actions.contains(&"project_deleted"));
}

#[tokio::test]
#[ignore]
async fn test_stats_count_by_status() {
    let server = TestServer::new();
    let project = new_project(&server).await;
    server
        .create(
            "/api/taskflow/tasks",
            &fixtures::tf_task(Some(&project), "In flight", "in_progress"),
        )
        .await;

    let (status, stats) = server
        .admin_get(&format!("/api/taskflow/stats?project_id={}", project))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 1);
    let in_progress = stats["by_status"]
        .as_array()
        .expect("by_status")
        .iter()
        .find(|s| s["status"] == "in_progress")
        .expect("in_progress count");
    assert_eq!(in_progress["count"], 1);
}
