//! Route definitions for the API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers;
use super::middleware::auth::admin_middleware;
use super::middleware::rate_limit::{rate_limit_middleware, spawn_cleanup, RateLimiter};
use super::middleware::security_headers::security_headers_middleware;
use super::middleware::tracing::correlation_id_middleware;
use super::SharedState;

/// JSON bodies on this API are small forms and admin edits.
const BODY_LIMIT: usize = 256 * 1024;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    let openapi = super::openapi::build_openapi();

    Router::new()
        // Health endpoints (no auth required)
        .route("/health", get(handlers::health::health_check))
        .route("/healthz", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/readyz", get(handlers::health::readiness_check))
        .route("/livez", get(handlers::health::liveness_check))
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", openapi))
        .nest("/api", api_routes(state.clone()))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(correlation_id_middleware))
        .with_state(state)
}

fn api_routes(state: SharedState) -> Router<SharedState> {
    let limiter = Arc::new(RateLimiter::new(
        state.config.public_rate_limit_per_minute,
        60,
    ));
    spawn_cleanup(limiter.clone());

    Router::new()
        .merge(public_routes())
        .merge(form_routes(limiter))
        .route("/slack/events", post(handlers::slack_events::slack_events))
        .merge(protected_routes(state))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}

/// Read-only public routes.
fn public_routes() -> Router<SharedState> {
    use handlers::chat;

    Router::new()
        .nest("/services", handlers::services::public_router())
        .nest("/packages", handlers::packages::public_router())
        .nest("/scoping", handlers::scoping::public_router())
        .nest("/booking", handlers::booking::public_router())
        .route(
            "/chat/conversations/:id/messages",
            get(chat::list_messages),
        )
        .route(
            "/chat/conversations/:id/close",
            post(chat::close_conversation),
        )
}

/// Public form submissions, limited per client IP and route.
fn form_routes(limiter: Arc<RateLimiter>) -> Router<SharedState> {
    use handlers::{booking, chat, contact, quotes};

    Router::new()
        .route("/contact", post(contact::submit_contact))
        .route("/quotes", post(quotes::create_quote))
        .route("/chat/conversations", post(chat::start_conversation))
        .route("/chat/conversations/:id/messages", post(chat::post_message))
        .route(
            "/booking/calendly/scheduling-link",
            post(booking::create_calendly_link),
        )
        .route("/booking/cal/bookings", post(booking::create_cal_booking))
        .route_layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ))
}

/// Everything behind the admin API key.
fn protected_routes(state: SharedState) -> Router<SharedState> {
    Router::new()
        .nest("/admin", admin_routes())
        .nest("/crm", crm_routes())
        .nest("/taskflow", taskflow_routes())
        .route_layer(middleware::from_fn_with_state(state, admin_middleware))
}

fn admin_routes() -> Router<SharedState> {
    Router::new()
        .nest("/services", handlers::services::admin_router())
        .nest("/packages", handlers::packages::admin_router())
        .nest("/scoping-factors", handlers::scoping::factors_router())
        .nest("/scoping-rules", handlers::scoping::rules_router())
        .nest("/quotes", handlers::quotes::admin_router())
        .nest("/contact-submissions", handlers::contact::admin_router())
        .nest("/conversations", handlers::chat::admin_router())
        .nest("/audit-logs", handlers::audit_logs::admin_router())
}

fn crm_routes() -> Router<SharedState> {
    Router::new()
        .nest("/companies", handlers::companies::router())
        .nest("/contacts", handlers::contacts::router())
        .nest("/deals", handlers::deals::router())
        .nest("/projects", handlers::crm_projects::router())
        .nest("/tasks", handlers::crm_tasks::router())
        .route("/pipeline", get(handlers::deals::pipeline))
}

fn taskflow_routes() -> Router<SharedState> {
    Router::new()
        .nest("/projects", handlers::taskflow_projects::router())
        .nest("/tasks", handlers::taskflow_tasks::router())
        .merge(handlers::taskflow_board::router())
}
