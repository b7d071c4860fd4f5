//! Chat relay conversations and messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "conversation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "message_sender", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    Visitor,
    Agent,
    System,
}

/// A visitor chat mirrored into a Slack thread.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Conversation {
    pub id: Uuid,
    pub visitor_name: String,
    pub visitor_email: String,
    pub status: ConversationStatus,
    pub slack_channel: Option<String>,
    /// Root message of the Slack thread replies are read from
    pub slack_thread_ts: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: MessageSender,
    pub content: String,
    pub slack_ts: Option<String>,
    pub created_at: DateTime<Utc>,
}
