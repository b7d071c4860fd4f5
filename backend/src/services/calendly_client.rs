//! Calendly API v2 client.
//!
//! Lists the consultant's event types and mints single-use scheduling links
//! so visitors can book from the site without exposing the public page.

use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use utoipa::ToSchema;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Calendly API client
#[derive(Clone)]
pub struct CalendlyClient {
    client: Client,
    base_url: String,
    api_token: String,
    user_uri: Option<String>,
}

redacted_debug!(CalendlyClient {
    show base_url,
    redact api_token,
    show user_uri,
});

/// Calendly event type
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CalendlyEventType {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub scheduling_url: Option<String>,
    #[serde(default)]
    pub description_plain: Option<String>,
}

/// Calendly user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CalendlyUser {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub scheduling_url: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Single-use booking link
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SchedulingLink {
    pub booking_url: String,
    pub owner: String,
    pub owner_type: String,
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    collection: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Resource<T> {
    resource: T,
}

impl CalendlyClient {
    /// Create a new Calendly client
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        user_uri: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            user_uri,
        })
    }

    /// Build from configuration; `None` when no token is set.
    pub fn from_config(config: &Config) -> Option<Result<Self>> {
        let token = config.calendly_api_token.clone()?;
        Some(Self::new(
            config.calendly_api_url.clone(),
            token,
            config.calendly_user_uri.clone(),
        ))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| AppError::Integration(format!("Calendly {} failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Calendly {} rejected", what);
            return Err(AppError::Integration(format!(
                "Calendly {} returned HTTP {}",
                what, status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Integration(format!("Invalid Calendly response: {}", e)))
    }

    /// The user owning the token.
    pub async fn get_current_user(&self) -> Result<CalendlyUser> {
        let url = format!("{}/users/me", self.base_url);
        let resource: Resource<CalendlyUser> =
            self.send(self.client.get(&url), "user lookup").await?;
        Ok(resource.resource)
    }

    /// Event types for the configured user, resolving `/users/me` when no
    /// user URI is configured.
    pub async fn list_event_types(&self) -> Result<Vec<CalendlyEventType>> {
        let user = match &self.user_uri {
            Some(uri) => uri.clone(),
            None => self.get_current_user().await?.uri,
        };

        let url = format!("{}/event_types", self.base_url);
        let page: Collection<CalendlyEventType> = self
            .send(
                self.client
                    .get(&url)
                    .query(&[("user", user.as_str()), ("active", "true")]),
                "event type listing",
            )
            .await?;

        Ok(page.collection)
    }

    /// Mint a link that can book the event type exactly once.
    pub async fn create_scheduling_link(&self, event_type_uri: &str) -> Result<SchedulingLink> {
        let url = format!("{}/scheduling_links", self.base_url);
        let body = json!({
            "max_event_count": 1,
            "owner": event_type_uri,
            "owner_type": "EventType",
        });
        let resource: Resource<SchedulingLink> = self
            .send(self.client.post(&url).json(&body), "scheduling link")
            .await?;

        tracing::info!(owner = event_type_uri, "Calendly scheduling link created");
        Ok(resource.resource)
    }
}
