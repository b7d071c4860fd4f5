//! Admin API key middleware.
//!
//! Admin, CRM and TaskFlow routes require the static key configured in
//! `ADMIN_API_KEY`, sent as either:
//! - `X-API-Key: <key>`
//! - `Authorization: Bearer <key>`

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderName},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use crate::api::SharedState;
use crate::error::AppError;

/// Custom header name for API key
static X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// Extension describing the authenticated admin caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminContext {
    /// First 8 hex chars of the key's SHA-256, safe to log and audit
    pub key_fingerprint: String,
}

impl AdminContext {
    /// Actor string recorded in the audit log.
    pub fn actor(&self) -> String {
        format!("key:{}", self.key_fingerprint)
    }
}

/// Key from `X-API-Key`, falling back to a Bearer token.
fn extract_key(request: &Request) -> Option<&str> {
    if let Some(key) = request
        .headers()
        .get(&X_API_KEY)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        return Some(key);
    }

    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

fn digest(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

/// Compare fixed-size digests so the check doesn't leak a matching prefix.
fn keys_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (digest(provided), digest(expected));
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Fingerprint shown in logs and audit entries.
pub fn fingerprint(key: &str) -> String {
    hex::encode(&digest(key)[..4])
}

/// Admin authentication middleware - requires the configured key
pub async fn admin_middleware(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(key) = extract_key(&request) else {
        return AppError::Authentication("Missing API key".to_string()).into_response();
    };

    if !keys_match(key, &state.config.admin_api_key) {
        return AppError::Authentication("Invalid API key".to_string()).into_response();
    }

    let context = AdminContext {
        key_fingerprint: fingerprint(key),
    };
    request.extensions_mut().insert(context);

    next.run(request).await
}
