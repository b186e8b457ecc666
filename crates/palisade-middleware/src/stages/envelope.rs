//! Error envelope stage.
//!
//! Sits just inside correlation so every denial is rendered with the
//! resolved request and trace IDs. Any non-2xx response flowing back out
//! is rewritten with the uniform JSON body
//! `{code, message, requestId, traceId?, hint?, details?}` and
//! `Cache-Control: no-store`; headers set by inner stages (rate-limit
//! counters, `Retry-After`, `Set-Cookie`) are preserved.
//!
//! Stages record a [`Denial`] in the context before short-circuiting.
//! A non-2xx response with no recorded denial gets a status-derived code
//! and a generic message, never internal detail.

use crate::context::GuardContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use bytes::Bytes;
use http_body_util::Full;
use palisade_core::{Denial, ErrorCode, ErrorEnvelope};

/// Stage that renders structured error bodies for denied requests.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeStage;

impl EnvelopeStage {
    /// Creates the envelope stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Fallback message for responses that carry no structured denial.
    fn generic_message(code: ErrorCode) -> &'static str {
        match code {
            ErrorCode::InvalidCorsConfig => "Invalid CORS configuration",
            ErrorCode::ForbiddenNullOrigin => "Null origin is not allowed",
            ErrorCode::PayloadTooLarge => "Request body exceeds the maximum allowed size",
            ErrorCode::UnsupportedMediaType => "Unsupported media type",
            ErrorCode::NotAcceptable => "Requested representation is not available",
            ErrorCode::RateLimited => "Too many requests",
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Forbidden",
            ErrorCode::ValidationError => "Request validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

impl Middleware for EnvelopeStage {
    fn name(&self) -> &'static str {
        "envelope"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut GuardContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_string();

            let response = next.run(ctx, request).await;
            let status = response.status();

            if !status.is_client_error() && !status.is_server_error() {
                return response;
            }

            let denial = ctx.denial().cloned().unwrap_or_else(|| {
                let code = ErrorCode::from_status(status);
                Denial::new(code, Self::generic_message(code))
            });

            let request_id = ctx.request_id().to_string();
            let envelope = ErrorEnvelope::from_denial(
                &denial,
                &request_id,
                ctx.trace().trace_id.as_deref(),
            );

            // Redacted audit event for every denial.
            tracing::warn!(
                user_id = ctx.claims().map(|c| c.log_id()),
                role = ctx.claims().map(|c| c.role.as_str()),
                status = status.as_u16(),
                code = denial.code.as_str(),
                verb = %method,
                path = %path,
                request_id = %request_id,
                "request denied"
            );

            let (mut parts, _) = response.into_parts();
            parts.headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            parts.headers.insert(
                http::header::CACHE_CONTROL,
                http::HeaderValue::from_static("no-store"),
            );

            Response::from_parts(parts, Full::new(Bytes::from(envelope.to_json())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::status_response;
    use http::StatusCode;
    use http_body_util::BodyExt;

    fn test_request() -> Request {
        http::Request::builder()
            .method(http::Method::POST)
            .uri("/posts")
            .body(Bytes::new())
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_passes_success_through() {
        let request = test_request();
        let mut ctx = GuardContext::for_request(&request);

        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { status_response(StatusCode::CREATED) })
        });
        let response = EnvelopeStage::new().process(&mut ctx, request, next).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(!response.headers().contains_key(http::header::CACHE_CONTROL));
    }

    #[tokio::test]
    async fn test_renders_recorded_denial() {
        let request = test_request();
        let mut ctx = GuardContext::for_request(&request);

        let next = Next::handler(|ctx: &mut GuardContext, _req| {
            ctx.set_denial(
                Denial::new(ErrorCode::NotAcceptable, "Requested representation is not available")
                    .with_hint("application/json"),
            );
            Box::pin(async { status_response(StatusCode::NOT_ACCEPTABLE) })
        });
        let response = EnvelopeStage::new().process(&mut ctx, request, next).await;

        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(
            response.headers().get(http::header::CACHE_CONTROL).unwrap(),
            "no-store"
        );

        let body = body_json(response).await;
        assert_eq!(body["code"], "NOT_ACCEPTABLE");
        assert_eq!(body["hint"], "application/json");
        assert!(body["requestId"].is_string());
        assert!(body.get("traceId").is_none());
    }

    #[tokio::test]
    async fn test_falls_back_to_status_derived_code() {
        let request = test_request();
        let mut ctx = GuardContext::for_request(&request);

        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { status_response(StatusCode::IM_A_TEAPOT) })
        });
        let response = EnvelopeStage::new().process(&mut ctx, request, next).await;

        let body = body_json(response).await;
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "An unexpected error occurred");
    }

    #[tokio::test]
    async fn test_preserves_inner_headers() {
        let request = test_request();
        let mut ctx = GuardContext::for_request(&request);

        let next = Next::handler(|ctx: &mut GuardContext, _req| {
            ctx.set_denial(Denial::new(ErrorCode::RateLimited, "Too many requests"));
            Box::pin(async {
                let mut response = status_response(StatusCode::TOO_MANY_REQUESTS);
                response
                    .headers_mut()
                    .insert("retry-after", http::HeaderValue::from_static("30"));
                response
            })
        });
        let response = EnvelopeStage::new().process(&mut ctx, request, next).await;

        assert_eq!(response.headers().get("retry-after").unwrap(), "30");
        let body = body_json(response).await;
        assert_eq!(body["code"], "RATE_LIMITED");
    }
}
