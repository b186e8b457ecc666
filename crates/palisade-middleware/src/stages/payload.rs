//! Payload size guard.
//!
//! Rejects oversized request bodies with 413 before any authentication
//! runs, so a caller cannot learn whether credentials are valid by sending
//! oversized payloads. The response carries no `Retry-After` and no
//! rate-limit headers; this guard sits outside the rate limiter.

use crate::context::{GuardContext, is_mutating};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, status_response};
use http::StatusCode;
use palisade_core::{Denial, ErrorCode};

/// Default body limit: 1 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Stage that enforces the maximum request body size.
///
/// `GET`, `HEAD` and `OPTIONS` bypass the check entirely.
#[derive(Debug, Clone)]
pub struct PayloadStage {
    /// Maximum accepted body length in bytes.
    max_body_bytes: usize,
}

impl PayloadStage {
    /// Creates the guard with an explicit limit.
    #[must_use]
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }
}

impl Default for PayloadStage {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_BYTES)
    }
}

impl Middleware for PayloadStage {
    fn name(&self) -> &'static str {
        "payload"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut GuardContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if is_mutating(request.method()) && ctx.profile().content_length > self.max_body_bytes {
                ctx.set_denial(Denial::new(
                    ErrorCode::PayloadTooLarge,
                    "Request body exceeds the maximum allowed size",
                ));
                return status_response(StatusCode::PAYLOAD_TOO_LARGE);
            }

            next.run(ctx, request).await
        })
    }
}
