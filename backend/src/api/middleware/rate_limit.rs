//! Rate limiting middleware for the public form endpoints.
//!
//! Contact, chat, quote and booking submissions are unauthenticated, so each
//! client IP gets a fixed window of requests per route.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    http::header::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::RwLock;

use crate::error::AppError;

/// Rate limiter that tracks requests per key.
#[derive(Debug)]
pub struct RateLimiter {
    /// Map of key -> (request count, window start time)
    requests: RwLock<HashMap<String, (u32, Instant)>>,
    /// Maximum number of requests allowed per window
    max_requests: u32,
    /// Duration of the rate limiting window
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter allowing `max_requests` per `window_secs`.
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            max_requests: max_requests.max(1),
            window: Duration::from_secs(window_secs),
        }
    }

    /// Count a request against `key`.
    ///
    /// Returns `Ok(remaining)` if allowed, or `Err(retry_after_secs)` once
    /// the window is exhausted.
    pub async fn check_rate_limit(&self, key: &str) -> Result<u32, u64> {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        let entry = requests.entry(key.to_string()).or_insert((0, now));

        if now.duration_since(entry.1) >= self.window {
            entry.0 = 1;
            entry.1 = now;
            return Ok(self.max_requests.saturating_sub(1));
        }

        if entry.0 >= self.max_requests {
            let elapsed = now.duration_since(entry.1).as_secs();
            return Err(self.window.as_secs().saturating_sub(elapsed).max(1));
        }

        entry.0 += 1;
        Ok(self.max_requests.saturating_sub(entry.0))
    }

    /// Drop entries whose window has passed.
    pub async fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window);
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

/// Spawn a task that periodically evicts expired windows.
pub fn spawn_cleanup(limiter: Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.cleanup_expired().await;
        }
    })
}

/// Rate limiting middleware keyed by client IP and matched route.
///
/// Returns 429 with `Retry-After` when the limit is exceeded.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let key = format!("{}|{}", extract_client_ip(&request), route);

    let limit = HeaderValue::from(limiter.max_requests);

    match limiter.check_rate_limit(&key).await {
        Ok(remaining) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", limit);
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
            response
        }
        Err(retry_after) => {
            tracing::warn!(key = %key, retry_after, "Rate limit exceeded");
            let mut response = AppError::RateLimited(format!(
                "Too many requests. Retry in {} seconds.",
                retry_after
            ))
            .into_response();
            let headers = response.headers_mut();
            headers.insert("Retry-After", HeaderValue::from(retry_after));
            headers.insert("X-RateLimit-Limit", limit);
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
            response
        }
    }
}

/// Client IP from the TCP peer address.
///
/// Proxy headers (X-Forwarded-For, X-Real-IP) are not trusted because
/// clients can set them freely.
pub(crate) fn extract_client_ip(request: &Request) -> String {
    match request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
    {
        Some(connect_info) => format!("ip:{}", connect_info.0.ip()),
        None => "ip:unknown".to_string(),
    }
}
