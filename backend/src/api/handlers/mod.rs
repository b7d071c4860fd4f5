//! HTTP request handlers.

pub mod audit_logs;
pub mod booking;
pub mod chat;
pub mod companies;
pub mod contact;
pub mod contacts;
pub mod crm_projects;
pub mod crm_tasks;
pub mod deals;
pub mod health;
pub mod packages;
pub mod quotes;
pub mod scoping;
pub mod services;
pub mod slack_events;
pub mod taskflow_board;
pub mod taskflow_projects;
pub mod taskflow_tasks;

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

use crate::api::middleware::auth::AdminContext;
use crate::api::middleware::tracing::CorrelationId;
use crate::services::audit_service::{AuditAction, AuditEntry, ResourceType};

/// Who made a request, for the audit log.
///
/// Never rejects: values that aren't available (no admin key on a public
/// route, no socket address under `oneshot`) are simply left out.
#[derive(Debug, Clone, Default)]
pub struct AuditMeta {
    pub actor: Option<String>,
    pub ip: Option<IpAddr>,
    pub correlation_id: Option<String>,
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuditMeta {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(Self {
            actor: parts.extensions.get::<AdminContext>().map(AdminContext::actor),
            ip: parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip()),
            correlation_id: parts
                .extensions
                .get::<CorrelationId>()
                .map(|id| id.as_str().to_string()),
        })
    }
}

impl AuditMeta {
    /// Start an audit entry attributed to this request.
    pub fn entry(&self, action: AuditAction, resource_type: ResourceType) -> AuditEntry {
        let mut entry = AuditEntry::new(action, resource_type)
            .actor(self.actor.clone().unwrap_or_else(|| "public".to_string()));
        if let Some(ip) = self.ip {
            entry = entry.ip(ip);
        }
        if let Some(id) = &self.correlation_id {
            entry = entry.correlation(id.clone());
        }
        entry
    }
}

/// `ILIKE` pattern for a free-text search term.
pub(crate) fn like_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let escaped = s
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{}%", escaped)
        })
}

/// Trimmed optional text, with blank strings treated as absent.
pub(crate) fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
    use tower::ServiceExt;

    use crate::api::{AppState, SharedState};
    use crate::config::Config;

    pub const TEST_ADMIN_KEY: &str = "test-admin-key-0123456789";

    /// State backed by a pool that only connects when a query runs.
    pub fn state() -> SharedState {
        state_with(&[])
    }

    /// Like [`state`], with extra configuration variables.
    pub fn state_with(extra: &[(&str, &str)]) -> SharedState {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/test".to_string()),
            "ADMIN_API_KEY" => Some(TEST_ADMIN_KEY.to_string()),
            other => extra
                .iter()
                .find(|(k, _)| *k == other)
                .map(|(_, v)| v.to_string()),
        })
        .expect("test config");

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(1))
            .idle_timeout(Duration::from_secs(1))
            .connect_lazy_with(PgConnectOptions::new().host("localhost").database("test"));

        Arc::new(AppState::from_config(config, pool).expect("test integrations"))
    }

    /// Send one request and decode the JSON body (or `Null` when empty).
    pub async fn send(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Assert a 400 whose message mentions `needle`.
    pub fn assert_validation(status: StatusCode, body: &Value, needle: &str) {
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        let message = body["message"].as_str().unwrap_or_default();
        assert!(
            message.contains(needle),
            "expected {:?} in {:?}",
            needle,
            message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    #[tokio::test]
    async fn test_audit_meta_reads_extensions() {
        let mut request = Request::builder().body(Body::empty()).unwrap();
        request.extensions_mut().insert(AdminContext {
            key_fingerprint: "deadbeef".to_string(),
        });
        request
            .extensions_mut()
            .insert(ConnectInfo("10.0.0.7:5000".parse::<SocketAddr>().unwrap()));
        request
            .extensions_mut()
            .insert(CorrelationId("req-1".to_string()));

        let (mut parts, _) = request.into_parts();
        let meta = AuditMeta::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(meta.actor.as_deref(), Some("key:deadbeef"));
        assert_eq!(meta.ip, Some("10.0.0.7".parse().unwrap()));
        assert_eq!(meta.correlation_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_audit_meta_tolerates_missing_extensions() {
        let (mut parts, _) = Request::builder().body(Body::empty()).unwrap().into_parts();
        let meta = AuditMeta::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(meta.actor.is_none());
        assert!(meta.ip.is_none());
        assert!(meta.correlation_id.is_none());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(Some(" acme ")).as_deref(), Some("%acme%"));
        assert_eq!(like_pattern(Some("50%_off")).as_deref(), Some("%50\\%\\_off%"));
        assert_eq!(like_pattern(Some("   ")), None);
        assert_eq!(like_pattern(None), None);
    }

    #[test]
    fn test_trimmed() {
        assert_eq!(trimmed(Some("  x ".to_string())).as_deref(), Some("x"));
        assert_eq!(trimmed(Some("  ".to_string())), None);
    }
}
