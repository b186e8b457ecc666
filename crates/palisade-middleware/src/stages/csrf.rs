//! CSRF validation stage.
//!
//! Applies only to mutating methods. Requires both the `csrf` cookie and
//! the `X-CSRF-Token` header; validation of the pair is delegated to
//! [`palisade_core::csrf`], which implements the dual-mode grammar:
//! legacy opaque double-submit, timestamp-bound tokens with a freshness
//! window, and session-bound suffixes recomputed for the authenticated
//! user.
//!
//! A session-bound token minted for a different user fails with the
//! distinct "CSRF token mismatch" message so audit logs can separate
//! stolen-token replays from garden-variety staleness.

use crate::context::{GuardContext, is_mutating};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, status_response};
use http::StatusCode;
use palisade_core::csrf::{self, CsrfVerdict};
use palisade_core::{Denial, ErrorCode};

/// The CSRF cookie name.
pub const CSRF_COOKIE: &str = "csrf";

/// The CSRF header name.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Stage that validates the double-submitted CSRF token pair.
pub struct CsrfStage {
    /// HMAC secret for recomputing session-bound suffixes.
    secret: Vec<u8>,
    /// Paths exempt from CSRF (login has no session yet).
    skip_paths: Vec<String>,
}

impl std::fmt::Debug for CsrfStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfStage")
            .field("skip_paths", &self.skip_paths)
            .finish_non_exhaustive()
    }
}

impl CsrfStage {
    /// Creates the CSRF validator.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, skip_paths: Vec<String>) -> Self {
        Self {
            secret: secret.into(),
            skip_paths,
        }
    }

    fn deny(ctx: &mut GuardContext, message: &str) -> Response {
        ctx.set_denial(Denial::new(ErrorCode::Forbidden, message));
        status_response(StatusCode::FORBIDDEN)
    }
}

impl Middleware for CsrfStage {
    fn name(&self) -> &'static str {
        "csrf"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut GuardContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if !is_mutating(request.method())
                || self.skip_paths.iter().any(|p| p == &ctx.profile().path)
            {
                return next.run(ctx, request).await;
            }

            let profile = ctx.profile();
            let (Some(cookie), Some(header)) =
                (profile.csrf_cookie.clone(), profile.csrf_header.clone())
            else {
                return Self::deny(ctx, "Missing CSRF token");
            };

            // A mutating request without claims at this point means a
            // skip-path mismatch upstream. Fail closed as 401.
            let Some(session_user) = ctx.claims().map(|c| c.user_id.clone()) else {
                ctx.set_denial(Denial::new(
                    ErrorCode::Unauthorized,
                    "Authentication required",
                ));
                return status_response(StatusCode::UNAUTHORIZED);
            };

            let now = chrono::Utc::now().timestamp();
            match csrf::validate_pair(&cookie, &header, now, &session_user, &self.secret) {
                CsrfVerdict::AcceptedLegacy | CsrfVerdict::AcceptedBound => {
                    next.run(ctx, request).await
                }
                CsrfVerdict::InvalidOrExpired => {
                    Self::deny(ctx, "Invalid or expired CSRF token")
                }
                CsrfVerdict::SessionMismatch => Self::deny(ctx, "CSRF token mismatch"),
            }
        })
    }
}
