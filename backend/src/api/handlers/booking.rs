//! Booking handlers backed by Calendly and Cal.com.
//!
//! Calendly bookings happen on calendly.com: the site only lists event types
//! and mints single-use scheduling links. Cal.com bookings are made directly
//! through its API, so those are validated and announced here.

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::DateTime;
use serde::Deserialize;
use utoipa::{OpenApi, ToSchema};

use super::trimmed;
use crate::api::validation;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::services::cal_com_client::{
    CalBooking, CalBookingRequest, CalEventType, CalSlot, SlotQuery,
};
use crate::services::calendly_client::{CalendlyEventType, SchedulingLink};
use crate::services::slack_service;

/// Read-only booking routes, nested under `/api/booking`.
pub fn public_router() -> Router<SharedState> {
    Router::new()
        .route("/calendly/event-types", get(list_calendly_event_types))
        .route("/cal/event-types", get(list_cal_event_types))
        .route("/cal/slots", get(get_cal_slots))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SchedulingLinkRequest {
    pub event_type_uri: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    pub event_type_id: Option<i64>,
    /// ISO-8601 start time of a slot returned by `/cal/slots`
    pub start: Option<String>,
    pub end: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub time_zone: Option<String>,
    pub notes: Option<String>,
}

fn rfc3339(field: &str, value: &str) -> Result<()> {
    DateTime::parse_from_rfc3339(value).map_err(|_| {
        AppError::Validation(format!("{} must be an ISO-8601 date-time", field))
    })?;
    Ok(())
}

impl CreateBookingRequest {
    fn validate(self) -> Result<CalBookingRequest> {
        let event_type_id = self
            .event_type_id
            .ok_or_else(|| AppError::Validation("event_type_id is required".to_string()))?;
        let name = validation::required("name", self.name.as_deref())?;
        validation::max_len("name", name, 200)?;
        let email = validation::required("email", self.email.as_deref())?;
        validation::email("email", email)?;
        let start = validation::required("start", self.start.as_deref())?;
        rfc3339("start", start)?;
        let end = trimmed(self.end);
        if let Some(end) = end.as_deref() {
            rfc3339("end", end)?;
        }
        let notes = trimmed(self.notes);
        if let Some(notes) = notes.as_deref() {
            validation::max_len("notes", notes, 2000)?;
        }

        Ok(CalBookingRequest {
            event_type_id,
            start: start.to_string(),
            end,
            name: name.to_string(),
            email: email.to_string(),
            notes,
            time_zone: trimmed(self.time_zone),
        })
    }
}

/// List active Calendly event types
#[utoipa::path(
    get,
    path = "/calendly/event-types",
    context_path = "/api/booking",
    tag = "booking",
    responses(
        (status = 200, description = "Active event types", body = Vec<CalendlyEventType>),
        (status = 502, description = "Calendly unavailable or not configured")
    )
)]
pub async fn list_calendly_event_types(
    State(state): State<SharedState>,
) -> Result<Json<Vec<CalendlyEventType>>> {
    let event_types = state.calendly()?.list_event_types().await?;
    Ok(Json(event_types))
}

/// Create a single-use Calendly scheduling link
#[utoipa::path(
    post,
    path = "/calendly/scheduling-link",
    context_path = "/api/booking",
    tag = "booking",
    request_body = SchedulingLinkRequest,
    responses(
        (status = 201, description = "Link created", body = SchedulingLink),
        (status = 400, description = "Validation error"),
        (status = 502, description = "Calendly unavailable or not configured")
    )
)]
pub async fn create_calendly_link(
    State(state): State<SharedState>,
    Json(payload): Json<SchedulingLinkRequest>,
) -> Result<(StatusCode, Json<SchedulingLink>)> {
    let uri = validation::required("event_type_uri", payload.event_type_uri.as_deref())?;
    if !uri.starts_with("https://") {
        return Err(AppError::Validation(
            "event_type_uri must be a Calendly event type URI".to_string(),
        ));
    }

    let link = state.calendly()?.create_scheduling_link(uri).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// List visible Cal.com event types
#[utoipa::path(
    get,
    path = "/cal/event-types",
    context_path = "/api/booking",
    tag = "booking",
    responses(
        (status = 200, description = "Visible event types", body = Vec<CalEventType>),
        (status = 502, description = "Cal.com unavailable or not configured")
    )
)]
pub async fn list_cal_event_types(
    State(state): State<SharedState>,
) -> Result<Json<Vec<CalEventType>>> {
    let event_types = state.cal_com()?.list_event_types().await?;
    Ok(Json(event_types))
}

/// Available Cal.com slots grouped by date
#[utoipa::path(
    get,
    path = "/cal/slots",
    context_path = "/api/booking",
    tag = "booking",
    params(SlotQuery),
    responses(
        (status = 200, description = "Slots keyed by date", body = BTreeMap<String, Vec<CalSlot>>),
        (status = 400, description = "Invalid window"),
        (status = 502, description = "Cal.com unavailable or not configured")
    )
)]
pub async fn get_cal_slots(
    State(state): State<SharedState>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<BTreeMap<String, Vec<CalSlot>>>> {
    let start = DateTime::parse_from_rfc3339(&query.start_time);
    let end = DateTime::parse_from_rfc3339(&query.end_time);
    match (start, end) {
        (Ok(start), Ok(end)) if start < end => {}
        (Ok(_), Ok(_)) => {
            return Err(AppError::Validation(
                "start must be before end".to_string(),
            ))
        }
        _ => {
            return Err(AppError::Validation(
                "start and end must be ISO-8601 date-times".to_string(),
            ))
        }
    }

    let slots = state.cal_com()?.get_slots(&query).await?;
    Ok(Json(slots))
}

/// Book a Cal.com slot
#[utoipa::path(
    post,
    path = "/cal/bookings",
    context_path = "/api/booking",
    tag = "booking",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = CalBooking),
        (status = 400, description = "Validation error"),
        (status = 429, description = "Too many requests"),
        (status = 502, description = "Cal.com rejected the booking or is not configured")
    )
)]
pub async fn create_cal_booking(
    State(state): State<SharedState>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CalBooking>)> {
    let request = payload.validate()?;
    let booking = state.cal_com()?.create_booking(&request).await?;

    if let Some(slack) = &state.slack {
        let message = slack_service::booking_message(
            "Cal.com",
            &request.name,
            &request.email,
            Some(&booking.start_time),
            booking.title.as_deref(),
        );
        if let Err(e) = slack.notify(&message).await {
            tracing::warn!(booking_id = booking.id, error = %e, "Failed to announce booking in Slack");
        }
    }

    Ok((StatusCode::CREATED, Json(booking)))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_calendly_event_types,
        create_calendly_link,
        list_cal_event_types,
        get_cal_slots,
        create_cal_booking,
    ),
    components(schemas(
        CalendlyEventType,
        SchedulingLink,
        SchedulingLinkRequest,
        CalEventType,
        CalSlot,
        CalBooking,
        CreateBookingRequest,
    ))
)]
pub struct BookingApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use httpmock::prelude::*;
    use serde_json::json;

    use crate::api::handlers::test_support::{self, assert_validation};

    fn app(state: SharedState) -> Router {
        public_router()
            .route("/calendly/scheduling-link", post(create_calendly_link))
            .route("/cal/bookings", post(create_cal_booking))
            .with_state(state)
    }

    fn booking(overrides: serde_json::Value) -> serde_json::Value {
        let mut body = json!({
            "event_type_id": 7,
            "start": "2026-11-02T15:00:00Z",
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "time_zone": "Europe/London",
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), overrides.as_object()) {
            for (k, v) in extra {
                body.insert(k.clone(), v.clone());
            }
        }
        body
    }

    #[tokio::test]
    async fn test_booking_requires_name() {
        let (status, body) = test_support::send(
            app(test_support::state()),
            "POST",
            "/cal/bookings",
            Some(booking(json!({ "name": "" }))),
        )
        .await;
        assert_validation(status, &body, "name is required");
    }

    #[tokio::test]
    async fn test_booking_rejects_bad_start() {
        let (status, body) = test_support::send(
            app(test_support::state()),
            "POST",
            "/cal/bookings",
            Some(booking(json!({ "start": "next tuesday" }))),
        )
        .await;
        assert_validation(status, &body, "start must be an ISO-8601");
    }

    #[tokio::test]
    async fn test_booking_unconfigured_is_integration_error() {
        let (status, body) = test_support::send(
            app(test_support::state()),
            "POST",
            "/cal/bookings",
            Some(booking(json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "INTEGRATION_ERROR");
        assert!(body["message"].as_str().unwrap().contains("Cal.com"));
    }

    #[tokio::test]
    async fn test_slots_window_must_be_ordered() {
        let (status, body) = test_support::send(
            app(test_support::state()),
            "GET",
            "/cal/slots?event_type_id=7&start=2026-11-05T00:00:00Z&end=2026-11-01T00:00:00Z",
            None,
        )
        .await;
        assert_validation(status, &body, "start must be before end");
    }

    #[tokio::test]
    async fn test_calendly_unconfigured_is_integration_error() {
        let (status, body) = test_support::send(
            app(test_support::state()),
            "GET",
            "/calendly/event-types",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["message"].as_str().unwrap().contains("Calendly"));
    }

    #[tokio::test]
    async fn test_scheduling_link_requires_uri() {
        let (status, body) = test_support::send(
            app(test_support::state()),
            "POST",
            "/calendly/scheduling-link",
            Some(json!({})),
        )
        .await;
        assert_validation(status, &body, "event_type_uri is required");
    }

    #[tokio::test]
    async fn test_cal_event_types_proxied() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/event-types");
                then.status(200).json_body(json!({
                    "event_types": [
                        { "id": 7, "title": "Discovery", "slug": "discovery", "length": 30 }
                    ]
                }));
            })
            .await;

        let base_url = server.base_url();
        let state = test_support::state_with(&[
            ("CAL_COM_API_KEY", "cal_test"),
            ("CAL_COM_API_URL", base_url.as_str()),
        ]);
        let (status, body) =
            test_support::send(app(state), "GET", "/cal/event-types", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["slug"], "discovery");
    }

    #[tokio::test]
    async fn test_cal_vendor_error_becomes_502() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/event-types");
                then.status(500).body("boom");
            })
            .await;

        let base_url = server.base_url();
        let state = test_support::state_with(&[
            ("CAL_COM_API_KEY", "cal_test"),
            ("CAL_COM_API_URL", base_url.as_str()),
        ]);
        let (status, body) =
            test_support::send(app(state), "GET", "/cal/event-types", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "INTEGRATION_ERROR");
    }
}
