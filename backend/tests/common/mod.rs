//! Shared helpers for the end-to-end tests.
//!
//! These talk to a running backend over HTTP:
//! - `TEST_BASE_URL` (default `http://127.0.0.1:8080`)
//! - `TEST_ADMIN_API_KEY` must match the server's `ADMIN_API_KEY`

#![allow(dead_code)]

pub mod fixtures;

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

/// Thin client over the API with and without the admin key.
pub struct TestServer {
    pub base_url: String,
    admin_key: String,
    client: Client,
}

impl TestServer {
    pub fn new() -> Self {
        let base_url = std::env::var("TEST_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
        let admin_key = std::env::var("TEST_ADMIN_API_KEY")
            .unwrap_or_else(|_| "dev-admin-key-change-me".to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_key,
            client: Client::new(),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        admin: bool,
    ) -> (StatusCode, Value) {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if admin {
            request = request.header("X-API-Key", &self.admin_key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.expect("request failed");
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let json = serde_json::from_str(&text).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(Method::GET, path, None, false).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        self.send(Method::POST, path, Some(body), false).await
    }

    pub async fn admin_get(&self, path: &str) -> (StatusCode, Value) {
        self.send(Method::GET, path, None, true).await
    }

    pub async fn admin_post(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        self.send(Method::POST, path, Some(body), true).await
    }

    pub async fn admin_patch(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, path, Some(body), true).await
    }

    pub async fn admin_delete(&self, path: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, path, None, true).await
    }

    /// Create through an admin endpoint and return the new row's id.
    pub async fn create(&self, path: &str, body: &Value) -> String {
        let (status, json) = self.admin_post(path, body).await;
        assert_eq!(status, StatusCode::CREATED, "POST {} -> {}", path, json);
        json["id"].as_str().expect("id in response").to_string()
    }
}

/// Unique suffix so reruns don't collide on slugs and keys.
pub fn test_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}
