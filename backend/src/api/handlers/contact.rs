//! Contact form handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use super::{like_pattern, trimmed};
use crate::api::dto::{Pagination, PaginationQuery};
use crate::api::validation;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::contact_submission::ContactSubmission;
use crate::services::slack_service;

const MAX_MESSAGE_LEN: usize = 5000;

/// Admin routes, nested under `/api/admin/contact-submissions`.
pub fn admin_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_submissions))
        .route("/:id", get(get_submission))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    /// Page or campaign the form was sent from
    pub source: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContactResponse {
    pub id: Uuid,
    pub received: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListSubmissionsQuery {
    /// Matches name, email, company or message
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmissionListResponse {
    pub items: Vec<ContactSubmission>,
    pub pagination: Pagination,
}

/// Submit the contact form
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/contact",
    tag = "contact",
    request_body = ContactRequest,
    responses(
        (status = 201, description = "Submission stored", body = ContactResponse),
        (status = 400, description = "Validation error"),
        (status = 429, description = "Too many submissions")
    )
)]
pub async fn submit_contact(
    State(state): State<SharedState>,
    Json(payload): Json<ContactRequest>,
) -> Result<(StatusCode, Json<ContactResponse>)> {
    let name = validation::required("name", payload.name.as_deref())?;
    validation::max_len("name", name, 200)?;
    let email = validation::required("email", payload.email.as_deref())?;
    validation::email("email", email)?;
    let message = validation::required("message", payload.message.as_deref())?;
    validation::max_len("message", message, MAX_MESSAGE_LEN)?;
    let company = trimmed(payload.company);
    if let Some(company) = company.as_deref() {
        validation::max_len("company", company, 200)?;
    }

    let submission: ContactSubmission = sqlx::query_as(
        r#"
        INSERT INTO contact_submissions (name, email, company, phone, message, source)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(email)
    .bind(&company)
    .bind(trimmed(payload.phone))
    .bind(message)
    .bind(trimmed(payload.source))
    .fetch_one(&state.db)
    .await?;

    tracing::info!(submission_id = %submission.id, "Contact submission stored");

    if let Some(slack) = &state.slack {
        match slack
            .notify(&slack_service::contact_message(&submission))
            .await
        {
            Ok(posted) => {
                if let Err(e) =
                    sqlx::query("UPDATE contact_submissions SET slack_ts = $2 WHERE id = $1")
                        .bind(submission.id)
                        .bind(&posted.ts)
                        .execute(&state.db)
                        .await
                {
                    tracing::warn!(submission_id = %submission.id, error = %e, "Failed to store Slack ts");
                }
            }
            Err(e) => {
                tracing::warn!(
                    submission_id = %submission.id,
                    error = %e,
                    "Failed to forward contact submission to Slack"
                );
            }
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(ContactResponse {
            id: submission.id,
            received: true,
        }),
    ))
}

/// List contact submissions (admin), newest first
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/admin/contact-submissions",
    tag = "contact",
    params(ListSubmissionsQuery, PaginationQuery),
    responses((status = 200, description = "Submissions", body = SubmissionListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_submissions(
    State(state): State<SharedState>,
    Query(query): Query<ListSubmissionsQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<SubmissionListResponse>> {
    let search = like_pattern(query.search.as_deref());

    let items: Vec<ContactSubmission> = sqlx::query_as(
        r#"
        SELECT * FROM contact_submissions
        WHERE ($1::text IS NULL OR name ILIKE $1 OR email ILIKE $1 OR company ILIKE $1 OR message ILIKE $1)
        ORDER BY created_at DESC
        OFFSET $2 LIMIT $3
        "#,
    )
    .bind(&search)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM contact_submissions
        WHERE ($1::text IS NULL OR name ILIKE $1 OR email ILIKE $1 OR company ILIKE $1 OR message ILIKE $1)
        "#,
    )
    .bind(&search)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(SubmissionListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a contact submission (admin)
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/admin/contact-submissions",
    tag = "contact",
    params(("id" = Uuid, Path, description = "Submission ID")),
    responses(
        (status = 200, description = "Submission", body = ContactSubmission),
        (status = 404, description = "Submission not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_submission(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ContactSubmission>> {
    let submission: ContactSubmission =
        sqlx::query_as("SELECT * FROM contact_submissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Contact submission not found".to_string()))?;
    Ok(Json(submission))
}

#[derive(OpenApi)]
#[openapi(
    paths(submit_contact, list_submissions, get_submission),
    components(schemas(
        ContactRequest,
        ContactResponse,
        ContactSubmission,
        SubmissionListResponse,
    ))
)]
pub struct ContactApiDoc;
