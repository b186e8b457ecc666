//! Correlation stage.
//!
//! The outermost stage resolves a request ID and best-effort trace ID for
//! every request. The request ID comes from the `X-Request-Id` header when
//! it carries a valid UUID, otherwise a fresh UUID v7 is generated. The
//! trace ID comes from a well-formed `traceparent`, falling back to
//! `x-trace-id`.
//!
//! ## Response Headers
//!
//! Every response gets `X-Request-Id`; when the caller sent a valid
//! `traceparent` it is echoed back so browser tooling can stitch spans.

use crate::context::GuardContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use palisade_core::{RequestId, TraceContext};
use uuid::Uuid;

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stage that resolves correlation identifiers.
///
/// # Behavior
///
/// 1. Parse `X-Request-Id`; use it when it is a valid UUID
/// 2. Otherwise generate a new UUID v7
/// 3. Resolve the trace ID from `traceparent` / `x-trace-id`
/// 4. Store both in the [`GuardContext`]
/// 5. Stamp `X-Request-Id` (and an echoed `traceparent`) on the response
#[derive(Debug, Clone, Default)]
pub struct CorrelationStage;

impl CorrelationStage {
    /// Creates the correlation stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for CorrelationStage {
    fn name(&self) -> &'static str {
        "correlation"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut GuardContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let profile = ctx.profile();

            let request_id = profile
                .request_id_header
                .as_deref()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map_or_else(RequestId::new, RequestId::from_uuid);

            let trace = TraceContext::resolve(
                profile.traceparent.as_deref(),
                profile.x_trace_id.as_deref(),
            );
            let echo_traceparent = trace.traceparent.clone();

            ctx.set_request_id(request_id);
            ctx.set_trace(trace);

            let mut response = next.run(ctx, request).await;

            response.headers_mut().insert(
                REQUEST_ID_HEADER,
                request_id.to_string().parse().expect("valid header value"),
            );
            if let Some(traceparent) = echo_traceparent {
                if let Ok(value) = traceparent.parse() {
                    response.headers_mut().insert("traceparent", value);
                }
            }

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::status_response;
    use bytes::Bytes;
    use http::StatusCode;

    fn handler() -> Next<'static> {
        Next::handler(|_ctx, _req| Box::pin(async { status_response(StatusCode::OK) }))
    }

    #[tokio::test]
    async fn test_generates_request_id_when_missing() {
        let request = http::Request::builder()
            .uri("/posts")
            .body(Bytes::new())
            .unwrap();
        let mut ctx = GuardContext::for_request(&request);

        let stage = CorrelationStage::new();
        let response = stage.process(&mut ctx, request, handler()).await;

        let header_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(Uuid::parse_str(header_id).is_ok());
        assert_eq!(ctx.request_id().to_string(), header_id);
    }

    #[tokio::test]
    async fn test_propagates_valid_incoming_id() {
        let incoming = "01234567-89ab-7def-8123-456789abcdef";
        let request = http::Request::builder()
            .uri("/posts")
            .header(REQUEST_ID_HEADER, incoming)
            .body(Bytes::new())
            .unwrap();
        let mut ctx = GuardContext::for_request(&request);

        let stage = CorrelationStage::new();
        let response = stage.process(&mut ctx, request, handler()).await;

        let header_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(header_id, incoming);
    }

    #[tokio::test]
    async fn test_ignores_invalid_incoming_id() {
        let request = http::Request::builder()
            .uri("/posts")
            .header(REQUEST_ID_HEADER, "not-a-uuid")
            .body(Bytes::new())
            .unwrap();
        let mut ctx = GuardContext::for_request(&request);

        let stage = CorrelationStage::new();
        let response = stage.process(&mut ctx, request, handler()).await;

        let header_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        assert_ne!(header_id, "not-a-uuid");
        assert!(Uuid::parse_str(header_id).is_ok());
    }

    #[tokio::test]
    async fn test_echoes_traceparent() {
        let traceparent = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";
        let request = http::Request::builder()
            .uri("/posts")
            .header("traceparent", traceparent)
            .body(Bytes::new())
            .unwrap();
        let mut ctx = GuardContext::for_request(&request);

        let stage = CorrelationStage::new();
        let response = stage.process(&mut ctx, request, handler()).await;

        assert_eq!(
            response.headers().get("traceparent").unwrap(),
            traceparent
        );
        assert_eq!(
            ctx.trace().trace_id.as_deref(),
            Some("0af7651916cd43dd8448eb211c80319c")
        );
    }
}
