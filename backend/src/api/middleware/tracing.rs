//! Correlation ID middleware.
//!
//! Every request runs inside an `http_request` span carrying a correlation ID
//! that is echoed back in `X-Correlation-ID` and recorded on audit entries.

use axum::{
    extract::Request,
    http::{header::HeaderValue, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// The header name for correlation IDs.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// W3C Trace Context header.
const TRACEPARENT_HEADER: &str = "traceparent";

/// Longest client-supplied correlation ID we accept.
const MAX_CORRELATION_ID_LEN: usize = 128;

/// Extension that holds the correlation ID for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn acceptable(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_CORRELATION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

/// Trace ID from a `version-traceid-parentid-flags` header.
fn trace_id(traceparent: &str) -> Option<&str> {
    let mut parts = traceparent.split('-');
    let _version = parts.next()?;
    let id = parts.next()?;
    (id.len() == 32 && id.chars().all(|c| c.is_ascii_hexdigit()) && id.chars().any(|c| c != '0'))
        .then_some(id)
}

/// Pick the correlation ID for a request.
///
/// Priority: `X-Correlation-ID`, then the trace ID of `traceparent`, else a
/// fresh UUID. Malformed values are ignored.
pub fn resolve(headers: &HeaderMap) -> CorrelationId {
    let header = |name: &str| headers.get(name).and_then(|h| h.to_str().ok()).map(str::trim);

    header(CORRELATION_ID_HEADER)
        .filter(|id| acceptable(id))
        .or_else(|| header(TRACEPARENT_HEADER).and_then(trace_id))
        .map(|id| CorrelationId(id.to_string()))
        .unwrap_or_else(CorrelationId::generate)
}

/// Correlation ID middleware.
pub async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = resolve(request.headers());

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    request.extensions_mut().insert(correlation_id.clone());

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id,
        method = %method,
        path = %path,
    );

    async move {
        let mut response = next.run(request).await;

        if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
            response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }

        tracing::info!(status = response.status().as_u16(), "Request completed");

        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_resolve_prefers_explicit_header() {
        let id = resolve(&headers(&[
            ("x-correlation-id", "req-42"),
            ("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        ]));
        assert_eq!(id.as_str(), "req-42");
    }

    #[test]
    fn test_resolve_uses_traceparent() {
        let id = resolve(&headers(&[(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )]));
        assert_eq!(id.as_str(), "4bf92f3577b34da6a3ce929d0e0e4736");
    }

    #[test]
    fn test_resolve_rejects_malformed_values() {
        let id = resolve(&headers(&[
            ("x-correlation-id", "has spaces <script>"),
            ("traceparent", "00-00000000000000000000000000000000-00f067aa0ba902b7-01"),
        ]));
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_resolve_generates_when_absent() {
        let id = resolve(&HeaderMap::new());
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[tokio::test]
    async fn test_middleware_echoes_header_and_sets_extension() {
        let app = Router::new()
            .route(
                "/echo",
                get(|Extension(id): Extension<CorrelationId>| async move { id.0 }),
            )
            .layer(middleware::from_fn(correlation_id_middleware));

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header("x-correlation-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.headers()[CORRELATION_ID_HEADER], "abc-123");
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"abc-123");
    }
}
