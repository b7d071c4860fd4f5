//! Live chat handlers.
//!
//! The widget starts a conversation, posts messages and polls
//! `GET .../messages?after=` for team replies relayed from Slack.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use super::AuditMeta;
use crate::api::dto::{Pagination, PaginationQuery};
use crate::api::validation;
use crate::api::SharedState;
use crate::error::Result;
use crate::models::conversation::{ChatMessage, Conversation, ConversationStatus, MessageSender};
use crate::services::audit_service::{AuditAction, ResourceType};

const MAX_MESSAGE_LEN: usize = 5000;

/// Admin routes, nested under `/api/admin/conversations`.
pub fn admin_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_conversations))
        .route("/:id", get(get_conversation))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartConversationRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationResponse {
    pub conversation: Conversation,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PostMessageRequest {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MessagesQuery {
    /// Only messages created after this RFC 3339 timestamp
    pub after: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListConversationsQuery {
    pub status: Option<ConversationStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationListResponse {
    pub items: Vec<Conversation>,
    pub pagination: Pagination,
}

fn message_text<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str> {
    let text = validation::required(field, value)?;
    validation::max_len(field, text, MAX_MESSAGE_LEN)?;
    Ok(text)
}

/// Start a chat conversation
///
/// Any active conversation for the same email is closed first.
#[utoipa::path(
    post,
    path = "/conversations",
    context_path = "/api/chat",
    tag = "chat",
    request_body = StartConversationRequest,
    responses(
        (status = 201, description = "Conversation started", body = ConversationResponse),
        (status = 400, description = "Validation error"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn start_conversation(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<StartConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>)> {
    let name = validation::required("name", payload.name.as_deref())?;
    validation::max_len("name", name, 200)?;
    let email = validation::required("email", payload.email.as_deref())?;
    validation::email("email", email)?;
    let message = message_text("message", payload.message.as_deref())?;

    let started = state.chat().start(name, email, message).await?;

    tracing::info!(
        conversation_id = %started.conversation.id,
        threaded = started.conversation.slack_thread_ts.is_some(),
        closed_previous = started.closed_previous.len(),
        "Chat conversation started"
    );

    let audit = state.audit();
    for previous in &started.closed_previous {
        audit
            .record(
                meta.entry(AuditAction::Closed, ResourceType::Conversation)
                    .resource(*previous)
                    .details(json!({ "reason": "superseded", "by": started.conversation.id })),
            )
            .await;
    }

    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse {
            conversation: started.conversation,
            messages: vec![started.message],
        }),
    ))
}

/// Send a visitor message
#[utoipa::path(
    post,
    path = "/conversations/{id}/messages",
    context_path = "/api/chat",
    tag = "chat",
    params(("id" = Uuid, Path, description = "Conversation ID")),
    request_body = PostMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = ChatMessage),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Conversation not found"),
        (status = 409, description = "Conversation is closed")
    )
)]
pub async fn post_message(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>)> {
    let content = message_text("content", payload.content.as_deref())?;
    let message = state.chat().post_visitor_message(id, content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Poll conversation messages
#[utoipa::path(
    get,
    path = "/conversations/{id}/messages",
    context_path = "/api/chat",
    tag = "chat",
    params(("id" = Uuid, Path, description = "Conversation ID"), MessagesQuery),
    responses(
        (status = 200, description = "Messages in insertion order", body = Vec<ChatMessage>),
        (status = 404, description = "Conversation not found")
    )
)]
pub async fn list_messages(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<ChatMessage>>> {
    Ok(Json(state.chat().messages(id, query.after).await?))
}

/// Close a conversation
#[utoipa::path(
    post,
    path = "/conversations/{id}/close",
    context_path = "/api/chat",
    tag = "chat",
    params(("id" = Uuid, Path, description = "Conversation ID")),
    responses(
        (status = 200, description = "Conversation closed", body = Conversation),
        (status = 404, description = "Conversation not found")
    )
)]
pub async fn close_conversation(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<Conversation>> {
    let chat = state.chat();
    let was_active = chat.get(id).await?.status == ConversationStatus::Active;
    let conversation = chat.close(id).await?;

    if was_active {
        state
            .audit()
            .record(
                meta.entry(AuditAction::Closed, ResourceType::Conversation)
                    .resource(id)
                    .details(json!({ "reason": "visitor" })),
            )
            .await;
    }

    Ok(Json(conversation))
}

/// List conversations (admin), most recently active first
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/admin/conversations",
    tag = "chat",
    params(ListConversationsQuery, PaginationQuery),
    responses((status = 200, description = "Conversations", body = ConversationListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_conversations(
    State(state): State<SharedState>,
    Query(query): Query<ListConversationsQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<ConversationListResponse>> {
    let items: Vec<Conversation> = sqlx::query_as(
        r#"
        SELECT * FROM conversations
        WHERE ($1::conversation_status IS NULL OR status = $1)
        ORDER BY updated_at DESC
        OFFSET $2 LIMIT $3
        "#,
    )
    .bind(query.status)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM conversations WHERE ($1::conversation_status IS NULL OR status = $1)",
    )
    .bind(query.status)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ConversationListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a conversation with its full transcript (admin)
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/admin/conversations",
    tag = "chat",
    params(("id" = Uuid, Path, description = "Conversation ID")),
    responses(
        (status = 200, description = "Conversation and messages", body = ConversationResponse),
        (status = 404, description = "Conversation not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_conversation(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationResponse>> {
    let chat = state.chat();
    let conversation = chat.get(id).await?;
    let messages = chat.messages(id, None).await?;
    Ok(Json(ConversationResponse {
        conversation,
        messages,
    }))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        start_conversation,
        post_message,
        list_messages,
        close_conversation,
        list_conversations,
        get_conversation,
    ),
    components(schemas(
        Conversation,
        ConversationStatus,
        ChatMessage,
        MessageSender,
        StartConversationRequest,
        ConversationResponse,
        PostMessageRequest,
        ConversationListResponse,
    ))
)]
pub struct ChatApiDoc;
