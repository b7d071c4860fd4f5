//! OpenAPI specification generated from handler annotations via utoipa.

use utoipa::openapi::security::{
    ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme,
};
use utoipa::{Modify, OpenApi};

use super::handlers;

/// Top-level OpenAPI document.
///
/// Each handler module contributes its own paths and schemas through a
/// per-module `#[derive(OpenApi)]` struct merged in [`build_openapi`].
#[derive(OpenApi)]
#[openapi(
    info(
        title = "RevOps Site API",
        description = "Service catalog, scoping calculator, lead capture, booking, CRM and TaskFlow.",
        version = "0.1.0"
    ),
    servers(
        (url = "/", description = "Current server"),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "catalog", description = "Services and packages"),
        (name = "scoping", description = "Scoping factors, rules, price calculation and quotes"),
        (name = "contact", description = "Contact form submissions"),
        (name = "chat", description = "Visitor chat relayed through Slack"),
        (name = "booking", description = "Calendly and Cal.com scheduling"),
        (name = "audit", description = "Audit log of admin and visitor actions"),
        (name = "crm", description = "Companies, contacts, deals, projects and tasks"),
        (name = "taskflow", description = "Internal kanban board"),
        (name = "health", description = "Health and readiness checks"),
    ),
    components(schemas(ErrorResponse))
)]
pub struct ApiDoc;

/// Standard error response body returned by all endpoints on failure.
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "NOT_FOUND", "VALIDATION_ERROR")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// Registers both ways of presenting the admin key.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
        }
    }
}

/// Build the merged OpenAPI document from all handler modules.
pub fn build_openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    doc.merge(handlers::health::HealthApiDoc::openapi());
    doc.merge(handlers::services::ServicesApiDoc::openapi());
    doc.merge(handlers::packages::PackagesApiDoc::openapi());
    doc.merge(handlers::scoping::ScopingApiDoc::openapi());
    doc.merge(handlers::quotes::QuotesApiDoc::openapi());
    doc.merge(handlers::contact::ContactApiDoc::openapi());
    doc.merge(handlers::chat::ChatApiDoc::openapi());
    doc.merge(handlers::slack_events::SlackEventsApiDoc::openapi());
    doc.merge(handlers::booking::BookingApiDoc::openapi());
    doc.merge(handlers::audit_logs::AuditLogsApiDoc::openapi());
    doc.merge(handlers::companies::CompaniesApiDoc::openapi());
    doc.merge(handlers::contacts::ContactsApiDoc::openapi());
    doc.merge(handlers::deals::DealsApiDoc::openapi());
    doc.merge(handlers::crm_projects::CrmProjectsApiDoc::openapi());
    doc.merge(handlers::crm_tasks::CrmTasksApiDoc::openapi());
    doc.merge(handlers::taskflow_projects::TaskflowProjectsApiDoc::openapi());
    doc.merge(handlers::taskflow_tasks::TaskflowTasksApiDoc::openapi());
    doc.merge(handlers::taskflow_board::TaskflowBoardApiDoc::openapi());

    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_is_valid() {
        let spec = build_openapi();
        assert_eq!(spec.info.title, "RevOps Site API");

        let components = spec.components.as_ref().expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.security_schemes.contains_key("api_key"));
        assert!(components.schemas.contains_key("ErrorResponse"));

        let tags: Vec<&str> = spec
            .tags
            .as_ref()
            .map_or(vec![], |t| t.iter().map(|tag| tag.name.as_str()).collect());
        for expected in ["catalog", "scoping", "chat", "booking", "crm", "taskflow"] {
            assert!(tags.contains(&expected), "Missing expected tag: {expected}");
        }

        let json = serde_json::to_string(&spec).expect("Spec should serialize to JSON");
        assert!(json.contains("RevOps Site API"));
    }

    #[test]
    fn test_every_area_has_paths() {
        let spec = build_openapi();
        let paths: Vec<&str> = spec.paths.paths.keys().map(|k| k.as_str()).collect();

        for prefix in [
            "/health",
            "/api/services",
            "/api/admin/services",
            "/api/scoping",
            "/api/quotes",
            "/api/contact",
            "/api/chat",
            "/api/slack",
            "/api/booking",
            "/api/admin/audit-logs",
            "/api/crm/companies",
            "/api/crm/deals",
            "/api/crm/pipeline",
            "/api/taskflow/board",
            "/api/taskflow/tasks",
        ] {
            assert!(
                paths.iter().any(|p| p.starts_with(prefix)),
                "No documented path under {prefix}"
            );
        }
    }

    #[test]
    fn test_admin_paths_declare_security() {
        let spec = build_openapi();
        for (path, item) in &spec.paths.paths {
            if !(path.starts_with("/api/admin")
                || path.starts_with("/api/crm")
                || path.starts_with("/api/taskflow"))
            {
                continue;
            }
            let operations = [&item.get, &item.post, &item.put, &item.patch, &item.delete];
            for operation in operations.into_iter().flatten() {
                assert!(
                    operation.security.is_some(),
                    "{path} is missing a security requirement"
                );
            }
        }
    }

    #[test]
    fn test_slack_events_documents_raw_json_body() {
        let spec = build_openapi();
        let body = spec
            .paths
            .paths
            .get("/api/slack/events")
            .and_then(|item| item.post.as_ref())
            .and_then(|op| op.request_body.as_ref())
            .expect("slack events request body");
        assert!(body.content.contains_key("application/json"));
    }
}
