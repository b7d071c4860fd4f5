//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Log level
    pub log_level: String,

    /// Deployment environment ("development" enables the CORS allow-list)
    pub environment: String,

    /// Allowed CORS origins in development
    pub cors_origins: Vec<String>,

    /// Static key required on every admin route
    pub admin_api_key: String,

    /// Slack bot token used for chat.postMessage
    pub slack_bot_token: Option<String>,

    /// Channel that receives leads, quotes and chat threads
    pub slack_channel_id: Option<String>,

    /// Signing secret used to verify Slack Events API requests
    pub slack_signing_secret: Option<String>,

    /// Slack Web API base URL
    pub slack_api_url: String,

    /// Calendly personal access token
    pub calendly_api_token: Option<String>,

    /// Calendly user URI whose event types are offered
    pub calendly_user_uri: Option<String>,

    /// Calendly API base URL
    pub calendly_api_url: String,

    /// Cal.com API key
    pub cal_com_api_key: Option<String>,

    /// Cal.com API base URL
    pub cal_com_api_url: String,

    /// OTLP collector endpoint (optional)
    pub otel_endpoint: Option<String>,

    /// Service name reported to the collector
    pub otel_service_name: String,

    /// Requests per minute allowed on each public form endpoint, per client
    pub public_rate_limit_per_minute: u32,
}

redacted_debug!(Config {
    redact database_url,
    show bind_address,
    show log_level,
    show environment,
    show cors_origins,
    redact admin_api_key,
    redact_option slack_bot_token,
    show slack_channel_id,
    redact_option slack_signing_secret,
    show slack_api_url,
    redact_option calendly_api_token,
    show calendly_user_uri,
    show calendly_api_url,
    redact_option cal_com_api_key,
    show cal_com_api_url,
    show otel_endpoint,
    show otel_service_name,
    show public_rate_limit_per_minute,
});

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let admin_api_key = non_empty("ADMIN_API_KEY")
            .ok_or_else(|| AppError::Config("ADMIN_API_KEY not set".into()))?;
        if admin_api_key.len() < 16 {
            return Err(AppError::Config(
                "ADMIN_API_KEY must be at least 16 characters".into(),
            ));
        }

        Ok(Self {
            database_url: non_empty("DATABASE_URL")
                .ok_or_else(|| AppError::Config("DATABASE_URL not set".into()))?,
            bind_address: non_empty("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".into()),
            log_level: non_empty("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            environment: non_empty("ENVIRONMENT").unwrap_or_else(|| "production".into()),
            cors_origins: non_empty("CORS_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            admin_api_key,
            slack_bot_token: non_empty("SLACK_BOT_TOKEN"),
            slack_channel_id: non_empty("SLACK_CHANNEL_ID"),
            slack_signing_secret: non_empty("SLACK_SIGNING_SECRET"),
            slack_api_url: non_empty("SLACK_API_URL")
                .unwrap_or_else(|| "https://slack.com/api".into()),
            calendly_api_token: non_empty("CALENDLY_API_TOKEN"),
            calendly_user_uri: non_empty("CALENDLY_USER_URI"),
            calendly_api_url: non_empty("CALENDLY_API_URL")
                .unwrap_or_else(|| "https://api.calendly.com".into()),
            cal_com_api_key: non_empty("CAL_COM_API_KEY"),
            cal_com_api_url: non_empty("CAL_COM_API_URL")
                .unwrap_or_else(|| "https://api.cal.com/v1".into()),
            otel_endpoint: non_empty("OTEL_EXPORTER_OTLP_ENDPOINT"),
            otel_service_name: non_empty("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| "revops-site-backend".into()),
            public_rate_limit_per_minute: non_empty("PUBLIC_RATE_LIMIT_PER_MINUTE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        })
    }

    /// Whether the server runs in local development mode.
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}
