//! Identity propagation guard.
//!
//! The last gate before business logic, mutating methods only, after CSRF
//! has passed. The BFF asserts the caller's identity to the inner API via
//! `X-User-Id` / `X-User-Role`; this stage cross-checks those headers
//! against the verified session so a direct API caller cannot impersonate
//! the frontend.
//!
//! Business logic downstream must resolve ownership strictly from the
//! session claims, never from these headers or from request-body fields.

use crate::context::{GuardContext, is_mutating};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, status_response};
use http::StatusCode;
use palisade_core::{Denial, ErrorCode, IdentityAssertion};

/// The asserted-identity header names.
pub const USER_ID_HEADER: &str = "x-user-id";
/// See [`USER_ID_HEADER`].
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Stage that cross-checks asserted identity headers against the session.
#[derive(Debug, Clone)]
pub struct IdentityPropagationStage {
    /// Paths exempt from the check (login carries no identity yet).
    skip_paths: Vec<String>,
}

impl IdentityPropagationStage {
    /// Creates the guard.
    #[must_use]
    pub fn new(skip_paths: Vec<String>) -> Self {
        Self { skip_paths }
    }

    fn deny(ctx: &mut GuardContext, message: &str) -> Response {
        ctx.set_denial(Denial::new(ErrorCode::Forbidden, message));
        status_response(StatusCode::FORBIDDEN)
    }
}

impl Middleware for IdentityPropagationStage {
    fn name(&self) -> &'static str {
        "identity_propagation"
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

            // Identity headers without a session are a 401, never
            // silently promoted to 403.
            let Some(claims) = ctx.claims().cloned() else {
                ctx.set_denial(Denial::new(
                    ErrorCode::Unauthorized,
                    "Authentication required",
                ));
                return status_response(StatusCode::UNAUTHORIZED);
            };

            let profile = ctx.profile();
            let (Some(user_id), Some(role)) = (
                profile.user_id_header.clone(),
                profile.user_role_header.clone(),
            ) else {
                return Self::deny(ctx, "Missing identity propagation headers");
            };

            let assertion = IdentityAssertion { user_id, role };

            if assertion.user_id != claims.user_id {
                tracing::warn!(
                    asserted = %assertion.user_id,
                    session = %claims.log_id(),
                    "identity header mismatch"
                );
                return Self::deny(ctx, "Identity header does not match authenticated user");
            }
            if assertion.role != claims.role {
                return Self::deny(
                    ctx,
                    "Identity header does not match authenticated user role",
                );
            }

            next.run(ctx, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Method;
    use palisade_core::SessionClaims;

    fn stage() -> IdentityPropagationStage {
        IdentityPropagationStage::new(vec!["/auth/login".to_string()])
    }

    fn handler() -> Next<'static> {
        Next::handler(|_ctx, _req| Box::pin(async { status_response(StatusCode::OK) }))
    }

    fn claims() -> SessionClaims {
        SessionClaims {
            user_id: "user-a".to_string(),
            role: "editor".to_string(),
            issued_at: 0,
            expires_at: i64::MAX,
            auth_time: None,
        }
    }

    fn request(method: Method, user_id: Option<&str>, role: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method(method).uri("/posts");
        if let Some(user_id) = user_id {
            builder = builder.header(USER_ID_HEADER, user_id);
        }
        if let Some(role) = role {
            builder = builder.header(USER_ROLE_HEADER, role);
        }
        builder.body(Bytes::new()).unwrap()
    }

    async fn run(request: Request, authenticated: bool) -> (StatusCode, Option<String>) {
        let mut ctx = GuardContext::for_request(&request);
        if authenticated {
            ctx.set_claims(claims());
        }
        let response = stage().process(&mut ctx, request, handler()).await;
        (response.status(), ctx.denial().map(|d| d.message.clone()))
    }

    #[tokio::test]
    async fn test_reads_bypass_guard() {
        let (status, _) = run(request(Method::GET, None, None), false).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_headers_is_403_with_valid_session() {
        let (status, message) = run(request(Method::POST, None, None), true).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            message.as_deref(),
            Some("Missing identity propagation headers")
        );
    }

    #[tokio::test]
    async fn test_partial_headers_is_403() {
        let (status, message) = run(request(Method::POST, Some("user-a"), None), true).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            message.as_deref(),
            Some("Missing identity propagation headers")
        );
    }

    #[tokio::test]
    async fn test_user_mismatch_is_403() {
        let (status, message) =
            run(request(Method::POST, Some("user-b"), Some("editor")), true).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            message.as_deref(),
            Some("Identity header does not match authenticated user")
        );
    }

    #[tokio::test]
    async fn test_role_mismatch_is_403() {
        let (status, message) =
            run(request(Method::POST, Some("user-a"), Some("admin")), true).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            message.as_deref(),
            Some("Identity header does not match authenticated user role")
        );
    }

    #[tokio::test]
    async fn test_exact_match_proceeds() {
        let (status, _) = run(request(Method::POST, Some("user-a"), Some("editor")), true).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_headers_without_session_is_401() {
        let (status, message) =
            run(request(Method::POST, Some("user-a"), Some("editor")), false).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message.as_deref(), Some("Authentication required"));
    }
}
