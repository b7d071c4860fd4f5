//! Slack Web API client and Events API signature verification.
//!
//! Leads, quotes, bookings and live-chat threads are posted to a single
//! channel with `chat.postMessage`. Replies typed by the team inside a chat
//! thread come back through the Events API.
//!
//! ## Configuration
//!
//! ```bash
//! SLACK_BOT_TOKEN=xoxb-...
//! SLACK_CHANNEL_ID=C0123456789
//! SLACK_SIGNING_SECRET=...
//! ```

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::contact_submission::ContactSubmission;
use crate::models::conversation::Conversation;
use crate::models::quote::Quote;

type HmacSha256 = Hmac<Sha256>;

/// Requests older (or newer) than this are rejected as replays.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Slack Web API client
#[derive(Clone)]
pub struct SlackClient {
    client: Client,
    api_url: String,
    bot_token: String,
    default_channel: Option<String>,
}

redacted_debug!(SlackClient {
    show api_url,
    redact bot_token,
    show default_channel,
});

/// A message Slack accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// Text fallback plus Block Kit layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SlackMessage {
    pub text: String,
    pub blocks: Option<Value>,
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocks: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
    unfurl_links: bool,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
    channel: Option<String>,
    ts: Option<String>,
}

impl SlackClient {
    /// Create a new Slack client
    pub fn new(
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
        default_channel: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            default_channel,
        })
    }

    /// Build from configuration; `None` when no bot token is set.
    pub fn from_config(config: &Config) -> Option<Result<Self>> {
        let token = config.slack_bot_token.clone()?;
        Some(Self::new(
            config.slack_api_url.clone(),
            token,
            config.slack_channel_id.clone(),
        ))
    }

    pub fn default_channel(&self) -> Option<&str> {
        self.default_channel.as_deref()
    }

    /// Post a message, optionally as a reply in a thread.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<&Value>,
        thread_ts: Option<&str>,
    ) -> Result<PostedMessage> {
        let url = format!("{}/chat.postMessage", self.api_url);
        let body = PostMessageRequest {
            channel,
            text,
            blocks,
            thread_ts,
            unfurl_links: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Integration(format!("Slack request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Integration(format!(
                "Slack returned HTTP {}",
                status
            )));
        }

        let parsed: PostMessageResponse = response
            .json()
            .await
            .map_err(|e| AppError::Integration(format!("Invalid Slack response: {}", e)))?;

        if !parsed.ok {
            return Err(AppError::Integration(format!(
                "Slack: {}",
                parsed.error.unwrap_or_else(|| "unknown_error".to_string())
            )));
        }

        let ts = parsed
            .ts
            .ok_or_else(|| AppError::Integration("Slack response missing ts".to_string()))?;

        tracing::debug!(channel, ts = %ts, threaded = thread_ts.is_some(), "Slack message posted");

        Ok(PostedMessage {
            channel: parsed.channel.unwrap_or_else(|| channel.to_string()),
            ts,
        })
    }

    /// Post to the configured channel.
    pub async fn notify(&self, message: &SlackMessage) -> Result<PostedMessage> {
        let channel = self
            .default_channel
            .as_deref()
            .ok_or_else(|| AppError::Integration("Slack channel not configured".to_string()))?;
        self.post_message(channel, &message.text, message.blocks.as_ref(), None)
            .await
    }
}

/// Verify a Slack Events API request.
///
/// `signature` is the `X-Slack-Signature` header (`v0=<hex>`), `timestamp`
/// the `X-Slack-Request-Timestamp` header and `now` the current unix time.
pub fn verify_signature(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: i64,
) -> Result<()> {
    let ts: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| AppError::Authentication("Invalid Slack timestamp".to_string()))?;

    if now.abs_diff(ts) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(AppError::Authentication(
            "Slack request timestamp outside tolerance".to_string(),
        ));
    }

    let provided = signature
        .strip_prefix("v0=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or_else(|| AppError::Authentication("Malformed Slack signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("HMAC init failed: {}", e)))?;
    mac.update(format!("v0:{}:", ts).as_bytes());
    mac.update(body);

    mac.verify_slice(&provided)
        .map_err(|_| AppError::Authentication("Invalid Slack signature".to_string()))
}

/// Compute the `v0=` signature for a body. Used by tests and local tooling.
pub fn sign(signing_secret: &str, timestamp: i64, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("HMAC init failed: {}", e)))?;
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    Ok(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}

// ---------------------------------------------------------------------------
// Message builders
// ---------------------------------------------------------------------------

/// Escape the three characters Slack treats as control sequences.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Format cents as `$1,234.56`.
pub fn format_cents(cents: i64) -> String {
    let negative = cents < 0;
    let cents = cents.unsigned_abs();
    let dollars = (cents / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!(
        "{}${}.{:02}",
        if negative { "-" } else { "" },
        grouped,
        cents % 100
    )
}

fn section(text: String) -> Value {
    json!({ "type": "section", "text": { "type": "mrkdwn", "text": text } })
}

fn fields(pairs: &[(&str, String)]) -> Value {
    let fields: Vec<Value> = pairs
        .iter()
        .map(|(label, value)| json!({ "type": "mrkdwn", "text": format!("*{}*\n{}", label, value) }))
        .collect();
    json!({ "type": "section", "fields": fields })
}

fn header(text: &str) -> Value {
    json!({ "type": "header", "text": { "type": "plain_text", "text": text } })
}

fn or_dash(value: Option<&str>) -> String {
    value.map(escape).unwrap_or_else(|| "-".to_string())
}

/// New contact form submission.
pub fn contact_message(submission: &ContactSubmission) -> SlackMessage {
    let text = format!(
        "New contact from {} <{}>",
        submission.name, submission.email
    );
    let blocks = json!([
        header("New contact submission"),
        fields(&[
            ("Name", escape(&submission.name)),
            ("Email", escape(&submission.email)),
            ("Company", or_dash(submission.company.as_deref())),
            ("Phone", or_dash(submission.phone.as_deref())),
            ("Source", or_dash(submission.source.as_deref())),
        ]),
        section(format!(">{}", escape(&submission.message).replace('\n', "\n>"))),
    ]);
    SlackMessage {
        text,
        blocks: Some(blocks),
    }
}

/// New quote request from the scoping calculator.
pub fn quote_message(quote: &Quote, package_name: &str) -> SlackMessage {
    let text = format!(
        "New quote request: {} for {} ({})",
        package_name,
        quote.name,
        format_cents(quote.total_price_cents)
    );
    let blocks = json!([
        header("New quote request"),
        fields(&[
            ("Package", escape(package_name)),
            ("Name", escape(&quote.name)),
            ("Email", escape(&quote.email)),
            ("Company", or_dash(quote.company.as_deref())),
            (
                "Estimate",
                format!(
                    "{} (base {})",
                    format_cents(quote.total_price_cents),
                    format_cents(quote.base_price_cents)
                ),
            ),
            (
                "Timeline",
                format!("{} weeks", quote.total_timeline_weeks),
            ),
        ]),
        section(format!("*Notes*\n{}", or_dash(quote.notes.as_deref()))),
    ]);
    SlackMessage {
        text,
        blocks: Some(blocks),
    }
}

/// Root message for a live-chat thread.
pub fn chat_opening_message(conversation: &Conversation, first_message: &str) -> SlackMessage {
    let text = format!(
        "Live chat from {} <{}>: {}",
        conversation.visitor_name, conversation.visitor_email, first_message
    );
    let blocks = json!([
        section(format!(
            ":speech_balloon: *Live chat* from *{}* ({})",
            escape(&conversation.visitor_name),
            escape(&conversation.visitor_email)
        )),
        section(escape(first_message)),
        json!({
            "type": "context",
            "elements": [{ "type": "mrkdwn", "text": format!("Reply in this thread to answer. Conversation `{}`", conversation.id) }]
        }),
    ]);
    SlackMessage {
        text,
        blocks: Some(blocks),
    }
}

/// Visitor reply posted inside an existing thread.
pub fn chat_reply_text(visitor_name: &str, content: &str) -> String {
    format!("*{}:* {}", escape(visitor_name), escape(content))
}

/// Booking announced by the Calendly/Cal.com flows.
pub fn booking_message(
    provider: &str,
    attendee_name: &str,
    attendee_email: &str,
    start_time: Option<&str>,
    event: Option<&str>,
) -> SlackMessage {
    let text = format!(
        "New {} booking: {} <{}>",
        provider, attendee_name, attendee_email
    );
    let blocks = json!([
        header("New booking"),
        fields(&[
            ("Provider", escape(provider)),
            ("Attendee", escape(attendee_name)),
            ("Email", escape(attendee_email)),
            ("Event", or_dash(event)),
            ("Start", or_dash(start_time)),
        ]),
    ]);
    SlackMessage {
        text,
        blocks: Some(blocks),
    }
}
