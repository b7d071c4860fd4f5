//! Live-chat relay between site visitors and a Slack thread.
//!
//! Each conversation owns one Slack thread. Visitor messages are posted into
//! it; team replies typed in the thread arrive through the Events API and are
//! stored as `agent` messages that the widget polls for.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::conversation::{ChatMessage, Conversation, ConversationStatus, MessageSender};
use crate::services::slack_service::{self, SlackClient};

/// What an incoming Events API payload asks us to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlackEvent {
    /// Endpoint handshake; echo the challenge.
    UrlVerification { challenge: String },
    /// A human reply inside a thread.
    ThreadReply {
        channel: Option<String>,
        thread_ts: String,
        ts: String,
        text: String,
    },
    /// Anything else (bot echoes, edits, top-level messages, other types).
    Ignored,
}

/// Classify an Events API payload.
pub fn classify_event(payload: &Value) -> SlackEvent {
    match payload.get("type").and_then(Value::as_str) {
        Some("url_verification") => match payload.get("challenge").and_then(Value::as_str) {
            Some(challenge) => SlackEvent::UrlVerification {
                challenge: challenge.to_string(),
            },
            None => SlackEvent::Ignored,
        },
        Some("event_callback") => {
            let Some(event) = payload.get("event") else {
                return SlackEvent::Ignored;
            };
            if event.get("type").and_then(Value::as_str) != Some("message")
                || event.get("bot_id").is_some()
                || event.get("subtype").is_some()
            {
                return SlackEvent::Ignored;
            }
            let str_field = |name: &str| event.get(name).and_then(Value::as_str).map(String::from);
            match (str_field("thread_ts"), str_field("ts"), str_field("text")) {
                (Some(thread_ts), Some(ts), Some(text))
                    if thread_ts != ts && !text.trim().is_empty() =>
                {
                    SlackEvent::ThreadReply {
                        channel: str_field("channel"),
                        thread_ts,
                        ts,
                        text,
                    }
                }
                _ => SlackEvent::Ignored,
            }
        }
        _ => SlackEvent::Ignored,
    }
}

/// Conversation plus its opening message.
#[derive(Debug, Clone)]
pub struct StartedConversation {
    pub conversation: Conversation,
    pub message: ChatMessage,
    /// Conversations closed because the same email started a new one.
    pub closed_previous: Vec<Uuid>,
}

/// Chat relay service
pub struct ChatService {
    db: PgPool,
    slack: Option<SlackClient>,
}

impl ChatService {
    pub fn new(db: PgPool, slack: Option<SlackClient>) -> Self {
        Self { db, slack }
    }

    /// Open a conversation, closing any earlier active one for this email.
    pub async fn start(&self, name: &str, email: &str, first_message: &str) -> Result<StartedConversation> {
        let mut tx = self.db.begin().await?;

        let closed_previous: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE conversations
            SET status = 'closed', closed_at = NOW(), updated_at = NOW()
            WHERE lower(visitor_email) = lower($1) AND status = 'active'
            RETURNING id
            "#,
        )
        .bind(email)
        .fetch_all(&mut *tx)
        .await?;

        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (visitor_name, visitor_email)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(email)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if !closed_previous.is_empty() {
            tracing::info!(
                email,
                closed = closed_previous.len(),
                "Closed previous active conversations"
            );
        }

        let conversation = self.open_thread(conversation, first_message).await;

        let message = self
            .insert_message(conversation.id, MessageSender::Visitor, first_message, None)
            .await?
            .ok_or_else(|| AppError::Internal("Opening message not stored".to_string()))?;

        Ok(StartedConversation {
            conversation,
            message,
            closed_previous,
        })
    }

    /// Post the thread root to Slack; on failure the conversation stays
    /// threadless.
    async fn open_thread(&self, conversation: Conversation, first_message: &str) -> Conversation {
        let Some(slack) = &self.slack else {
            return conversation;
        };
        let Some(channel) = slack.default_channel() else {
            return conversation;
        };

        let msg = slack_service::chat_opening_message(&conversation, first_message);
        let posted = match slack
            .post_message(channel, &msg.text, msg.blocks.as_ref(), None)
            .await
        {
            Ok(posted) => posted,
            Err(e) => {
                tracing::warn!(conversation_id = %conversation.id, "Slack thread not created: {}", e);
                return conversation;
            }
        };

        match sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations
            SET slack_channel = $2, slack_thread_ts = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(conversation.id)
        .bind(&posted.channel)
        .bind(&posted.ts)
        .fetch_one(&self.db)
        .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(conversation_id = %conversation.id, "Failed to store Slack thread: {}", e);
                conversation
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Conversation> {
        sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))
    }

    /// Store a visitor message and mirror it into the Slack thread.
    pub async fn post_visitor_message(&self, id: Uuid, content: &str) -> Result<ChatMessage> {
        let conversation = self.get(id).await?;
        if conversation.status == ConversationStatus::Closed {
            return Err(AppError::Conflict("Conversation is closed".to_string()));
        }

        let message = self
            .insert_message(id, MessageSender::Visitor, content, None)
            .await?
            .ok_or_else(|| AppError::Internal("Message not stored".to_string()))?;

        if let (Some(slack), Some(channel), Some(thread_ts)) = (
            &self.slack,
            conversation.slack_channel.as_deref(),
            conversation.slack_thread_ts.as_deref(),
        ) {
            let text = slack_service::chat_reply_text(&conversation.visitor_name, content);
            if let Err(e) = slack.post_message(channel, &text, None, Some(thread_ts)).await {
                tracing::warn!(conversation_id = %id, "Failed to mirror message to Slack: {}", e);
            }
        }

        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(message)
    }

    /// Messages in insertion order, optionally only those after `after`.
    pub async fn messages(&self, id: Uuid, after: Option<DateTime<Utc>>) -> Result<Vec<ChatMessage>> {
        self.get(id).await?;

        let messages = sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT * FROM chat_messages
            WHERE conversation_id = $1 AND ($2::timestamptz IS NULL OR created_at > $2)
            ORDER BY created_at, id
            "#,
        )
        .bind(id)
        .bind(after)
        .fetch_all(&self.db)
        .await?;

        Ok(messages)
    }

    /// Close a conversation. Closing twice is a no-op.
    pub async fn close(&self, id: Uuid) -> Result<Conversation> {
        let conversation = self.get(id).await?;
        if conversation.status == ConversationStatus::Closed {
            return Ok(conversation);
        }

        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations
            SET status = 'closed', closed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        self.insert_message(id, MessageSender::System, "Conversation closed", None)
            .await?;

        if let (Some(slack), Some(channel), Some(thread_ts)) = (
            &self.slack,
            conversation.slack_channel.as_deref(),
            conversation.slack_thread_ts.as_deref(),
        ) {
            if let Err(e) = slack
                .post_message(channel, "_Visitor closed the chat._", None, Some(thread_ts))
                .await
            {
                tracing::warn!(conversation_id = %id, "Failed to announce close in Slack: {}", e);
            }
        }

        Ok(conversation)
    }

    /// Store a team reply from a Slack thread.
    ///
    /// Returns `None` when no active conversation owns the thread or the
    /// message was already stored (Slack retries deliveries).
    pub async fn record_agent_reply(
        &self,
        thread_ts: &str,
        slack_ts: &str,
        text: &str,
    ) -> Result<Option<ChatMessage>> {
        let conversation: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM conversations WHERE slack_thread_ts = $1 AND status = 'active' LIMIT 1",
        )
        .bind(thread_ts)
        .fetch_optional(&self.db)
        .await?;

        let Some(conversation_id) = conversation else {
            tracing::debug!(thread_ts, "Reply for unknown or closed thread ignored");
            return Ok(None);
        };

        let message = self
            .insert_message(conversation_id, MessageSender::Agent, text, Some(slack_ts))
            .await?;

        if message.is_some() {
            sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
                .bind(conversation_id)
                .execute(&self.db)
                .await?;
        }

        Ok(message)
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender: MessageSender,
        content: &str,
        slack_ts: Option<&str>,
    ) -> Result<Option<ChatMessage>> {
        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages (conversation_id, sender, content, slack_ts)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (conversation_id, slack_ts) WHERE slack_ts IS NOT NULL DO NOTHING
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(sender)
        .bind(content)
        .bind(slack_ts)
        .fetch_optional(&self.db)
        .await?;

        Ok(message)
    }
}
