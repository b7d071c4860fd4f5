//! Cal.com API v1 client.
//!
//! Authenticates with the `apiKey` query parameter.

use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use utoipa::{IntoParams, ToSchema};

use crate::config::Config;
use crate::error::{AppError, Result};

/// Cal.com API client
#[derive(Clone)]
pub struct CalComClient {
    client: Client,
    base_url: String,
    api_key: String,
}

redacted_debug!(CalComClient {
    show base_url,
    redact api_key,
});

/// Cal.com event type
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalEventType {
    pub id: i64,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub length: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

/// One bookable start time
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CalSlot {
    pub time: String,
}

/// Slot lookup window
#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
pub struct SlotQuery {
    pub event_type_id: i64,
    /// ISO-8601 start of the window
    #[serde(alias = "start")]
    pub start_time: String,
    /// ISO-8601 end of the window
    #[serde(alias = "end")]
    pub end_time: String,
    pub time_zone: Option<String>,
}

/// Booking request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CalBookingRequest {
    pub event_type_id: i64,
    /// ISO-8601 start time of a slot returned by the slot lookup
    pub start: String,
    pub end: Option<String>,
    pub name: String,
    pub email: String,
    pub notes: Option<String>,
    pub time_zone: Option<String>,
}

/// Booking created in Cal.com
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalBooking {
    pub id: i64,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventTypesResponse {
    event_types: Vec<CalEventType>,
}

#[derive(Debug, Deserialize)]
struct SlotsResponse {
    slots: BTreeMap<String, Vec<CalSlot>>,
}

impl CalComClient {
    /// Create a new Cal.com client
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Build from configuration; `None` when no key is set.
    pub fn from_config(config: &Config) -> Option<Result<Self>> {
        let key = config.cal_com_api_key.clone()?;
        Some(Self::new(config.cal_com_api_url.clone(), key))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| AppError::Integration(format!("Cal.com {} failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Cal.com {} rejected", what);
            return Err(AppError::Integration(format!(
                "Cal.com {} returned HTTP {}",
                what, status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Integration(format!("Invalid Cal.com response: {}", e)))
    }

    /// Visible event types.
    pub async fn list_event_types(&self) -> Result<Vec<CalEventType>> {
        let url = format!("{}/event-types", self.base_url);
        let resp: EventTypesResponse = self
            .send(self.client.get(&url), "event type listing")
            .await?;
        Ok(resp.event_types.into_iter().filter(|t| !t.hidden).collect())
    }

    /// Available slots grouped by date, in date order.
    pub async fn get_slots(&self, query: &SlotQuery) -> Result<BTreeMap<String, Vec<CalSlot>>> {
        let url = format!("{}/slots", self.base_url);
        let event_type_id = query.event_type_id.to_string();
        let mut params = vec![
            ("eventTypeId", event_type_id.as_str()),
            ("startTime", query.start_time.as_str()),
            ("endTime", query.end_time.as_str()),
        ];
        if let Some(tz) = &query.time_zone {
            params.push(("timeZone", tz.as_str()));
        }

        let resp: SlotsResponse = self
            .send(self.client.get(&url).query(&params), "slot lookup")
            .await?;
        Ok(resp.slots)
    }

    /// Book a slot for a visitor.
    pub async fn create_booking(&self, request: &CalBookingRequest) -> Result<CalBooking> {
        let url = format!("{}/bookings", self.base_url);
        let mut responses = json!({
            "name": request.name,
            "email": request.email,
        });
        if let Some(notes) = &request.notes {
            responses["notes"] = Value::String(notes.clone());
        }
        let mut body = json!({
            "eventTypeId": request.event_type_id,
            "start": request.start,
            "responses": responses,
            "timeZone": request.time_zone.as_deref().unwrap_or("UTC"),
            "language": "en",
            "metadata": {},
        });
        if let Some(end) = &request.end {
            body["end"] = Value::String(end.clone());
        }

        let booking: CalBooking = self
            .send(self.client.post(&url).json(&body), "booking")
            .await?;

        tracing::info!(booking_id = booking.id, "Cal.com booking created");
        Ok(booking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_list_event_types_filters_hidden() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/event-types")
                    .query_param("apiKey", "cal_test");
                then.status(200).json_body(json!({
                    "event_types": [
                        { "id": 1, "title": "Intro", "slug": "intro", "length": 15, "hidden": false },
                        { "id": 2, "title": "Internal", "slug": "internal", "length": 60, "hidden": true }
                    ]
                }));
            })
            .await;

        let client = CalComClient::new(server.base_url(), "cal_test").unwrap();
        let types = client.list_event_types().await.unwrap();

        mock.assert_async().await;
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].slug, "intro");
    }

    #[tokio::test]
    async fn test_get_slots() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/slots")
                    .query_param("eventTypeId", "7")
                    .query_param("startTime", "2026-01-05T00:00:00Z")
                    .query_param("endTime", "2026-01-06T00:00:00Z")
                    .query_param("apiKey", "k");
                then.status(200).json_body(json!({
                    "slots": {
                        "2026-01-05": [
                            { "time": "2026-01-05T15:00:00Z" },
                            { "time": "2026-01-05T15:30:00Z" }
                        ]
                    }
                }));
            })
            .await;

        let client = CalComClient::new(server.base_url(), "k").unwrap();
        let slots = client
            .get_slots(&SlotQuery {
                event_type_id: 7,
                start_time: "2026-01-05T00:00:00Z".to_string(),
                end_time: "2026-01-06T00:00:00Z".to_string(),
                time_zone: None,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(slots["2026-01-05"].len(), 2);
    }

    #[tokio::test]
    async fn test_create_booking() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/bookings")
                    .query_param("apiKey", "k")
                    .json_body_partial(
                        r#"{"eventTypeId":7,"responses":{"name":"Grace","email":"grace@example.com"}}"#,
                    );
                then.status(200).json_body(json!({
                    "id": 99,
                    "uid": "bk_1",
                    "title": "Intro between Acme and Grace",
                    "startTime": "2026-01-05T15:00:00Z",
                    "endTime": "2026-01-05T15:15:00Z",
                    "status": "ACCEPTED"
                }));
            })
            .await;

        let client = CalComClient::new(server.base_url(), "k").unwrap();
        let booking = client
            .create_booking(&CalBookingRequest {
                event_type_id: 7,
                start: "2026-01-05T15:00:00Z".to_string(),
                end: None,
                name: "Grace".to_string(),
                email: "grace@example.com".to_string(),
                notes: None,
                time_zone: None,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(booking.id, 99);
        assert_eq!(booking.status.as_deref(), Some("ACCEPTED"));
    }

    #[tokio::test]
    async fn test_vendor_error_maps_to_integration() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/bookings");
                then.status(400).json_body(json!({ "message": "no_available_users_found_error" }));
            })
            .await;

        let client = CalComClient::new(server.base_url(), "k").unwrap();
        let err = client
            .create_booking(&CalBookingRequest {
                event_type_id: 1,
                start: "2026-01-05T15:00:00Z".to_string(),
                end: None,
                name: "A".to_string(),
                email: "a@b.co".to_string(),
                notes: None,
                time_zone: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Integration(_)));
    }
}
