//! API module - HTTP handlers and middleware.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod validation;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::services::audit_service::AuditService;
use crate::services::cal_com_client::CalComClient;
use crate::services::calendly_client::CalendlyClient;
use crate::services::chat_service::ChatService;
use crate::services::scoping_service::ScopingService;
use crate::services::slack_service::SlackClient;
use crate::services::taskflow_service::TaskflowService;
use sqlx::PgPool;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub slack: Option<SlackClient>,
    pub calendly: Option<CalendlyClient>,
    pub cal_com: Option<CalComClient>,
}

impl AppState {
    /// State with no third-party integrations.
    pub fn new(config: Config, db: PgPool) -> Self {
        Self {
            config,
            db,
            slack: None,
            calendly: None,
            cal_com: None,
        }
    }

    /// Build every client whose credentials are configured.
    pub fn from_config(config: Config, db: PgPool) -> Result<Self> {
        let slack = SlackClient::from_config(&config).transpose()?;
        let calendly = CalendlyClient::from_config(&config).transpose()?;
        let cal_com = CalComClient::from_config(&config).transpose()?;

        tracing::info!(
            slack = slack.is_some(),
            calendly = calendly.is_some(),
            cal_com = cal_com.is_some(),
            "Integrations configured"
        );

        Ok(Self {
            config,
            db,
            slack,
            calendly,
            cal_com,
        })
    }

    pub fn audit(&self) -> AuditService {
        AuditService::new(self.db.clone())
    }

    pub fn scoping(&self) -> ScopingService {
        ScopingService::new(self.db.clone())
    }

    pub fn chat(&self) -> ChatService {
        ChatService::new(self.db.clone(), self.slack.clone())
    }

    pub fn taskflow(&self) -> TaskflowService {
        TaskflowService::new(self.db.clone())
    }

    pub fn calendly(&self) -> Result<&CalendlyClient> {
        self.calendly
            .as_ref()
            .ok_or_else(|| AppError::Integration("Calendly is not configured".to_string()))
    }

    pub fn cal_com(&self) -> Result<&CalComClient> {
        self.cal_com
            .as_ref()
            .ok_or_else(|| AppError::Integration("Cal.com is not configured".to_string()))
    }
}

pub type SharedState = Arc<AppState>;
