//! Slack Events API endpoint.
//!
//! Team members answer visitors by replying in the conversation's Slack
//! thread; Slack delivers those replies here. Requests are authenticated by
//! Slack's HMAC signature over the raw body, so the body is read as bytes
//! and only parsed after verification.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use utoipa::OpenApi;

use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::services::chat_service::{classify_event, SlackEvent};
use crate::services::slack_service;

const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const SIGNATURE_HEADER: &str = "x-slack-signature";
const RETRY_HEADER: &str = "x-slack-retry-num";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Receive Slack events
#[utoipa::path(
    post,
    path = "/events",
    context_path = "/api/slack",
    tag = "chat",
    request_body(
        content = String,
        description = "Raw event payload, verified against X-Slack-Signature",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Event acknowledged, or url_verification challenge echoed"),
        (status = 400, description = "Body is not JSON"),
        (status = 401, description = "Missing, stale or invalid signature"),
        (status = 502, description = "Signing secret not configured")
    )
)]
pub async fn slack_events(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let secret = state
        .config
        .slack_signing_secret
        .as_deref()
        .ok_or_else(|| AppError::Integration("Slack events are not configured".to_string()))?;

    let timestamp = header(&headers, TIMESTAMP_HEADER)
        .ok_or_else(|| AppError::Authentication("Missing Slack timestamp".to_string()))?;
    let signature = header(&headers, SIGNATURE_HEADER)
        .ok_or_else(|| AppError::Authentication("Missing Slack signature".to_string()))?;

    slack_service::verify_signature(
        secret,
        timestamp,
        &body,
        signature,
        chrono::Utc::now().timestamp(),
    )?;

    let payload: Value = serde_json::from_slice(&body)?;

    match classify_event(&payload) {
        SlackEvent::UrlVerification { challenge } => {
            tracing::info!("Slack URL verification handshake");
            Ok(Json(json!({ "challenge": challenge })).into_response())
        }
        SlackEvent::ThreadReply {
            channel,
            thread_ts,
            ts,
            text,
        } => {
            let retry = header(&headers, RETRY_HEADER);
            match state
                .chat()
                .record_agent_reply(&thread_ts, &ts, &text)
                .await?
            {
                Some(message) => tracing::info!(
                    conversation_id = %message.conversation_id,
                    channel = channel.as_deref().unwrap_or("-"),
                    "Agent reply relayed"
                ),
                None => tracing::debug!(thread_ts = %thread_ts, ts = %ts, retry, "Slack reply not stored"),
            }
            Ok(Json(json!({ "ok": true })).into_response())
        }
        SlackEvent::Ignored => Ok(Json(json!({ "ok": true })).into_response()),
    }
}

#[derive(OpenApi)]
#[openapi(paths(slack_events))]
pub struct SlackEventsApiDoc;
