//! Session authentication stage.
//!
//! Verifies the signed `session` cookie, attaches the claims to the
//! context for the CSRF and identity stages, and decides rotation.
//!
//! ## Token States
//!
//! `NoToken`, `Invalid`, `Valid(fresh)`, `Valid(stale)`, `Expired`:
//!
//! - A presented token that is malformed, mis-signed, or expired is 401 on
//!   any method.
//! - No token on a read proceeds anonymously; a bearer token, when it
//!   verifies, identifies the caller on reads but is never sufficient for
//!   mutations, which always require the cookie (plus CSRF and identity
//!   propagation downstream).
//! - A valid token older than the rotation threshold triggers a
//!   `Set-Cookie` replacement with the same `(user_id, role)` and fresh
//!   timestamps, without changing the current request's outcome.

use crate::context::{GuardContext, is_mutating};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, status_response};
use http::{HeaderValue, StatusCode};
use palisade_core::{Denial, ErrorCode, SESSION_TTL_SECS, SessionTokenCodec};
use std::sync::Arc;

/// The session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// Builds the `Set-Cookie` value for a session token.
#[must_use]
pub fn session_cookie_value(token: &str, secure: bool) -> String {
    let mut value = format!(
        "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/; Max-Age={SESSION_TTL_SECS}"
    );
    if secure {
        value.push_str("; Secure");
    }
    value
}

/// Stage that authenticates the session cookie.
pub struct SessionStage {
    /// Token codec holding the signing secret.
    codec: Arc<SessionTokenCodec>,
    /// Production mode adds the `Secure` cookie attribute.
    production: bool,
    /// Paths exempt from authentication (login has no session yet).
    skip_paths: Vec<String>,
}

impl std::fmt::Debug for SessionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStage")
            .field("production", &self.production)
            .field("skip_paths", &self.skip_paths)
            .finish_non_exhaustive()
    }
}

impl SessionStage {
    /// Creates the session authenticator.
    #[must_use]
    pub fn new(codec: Arc<SessionTokenCodec>, production: bool, skip_paths: Vec<String>) -> Self {
        Self {
            codec,
            production,
            skip_paths,
        }
    }

    fn deny_invalid(ctx: &mut GuardContext) -> Response {
        ctx.set_denial(Denial::new(
            ErrorCode::Unauthorized,
            "Invalid or expired authentication token",
        ));
        status_response(StatusCode::UNAUTHORIZED)
    }

    fn deny_missing(ctx: &mut GuardContext) -> Response {
        ctx.set_denial(Denial::new(
            ErrorCode::Unauthorized,
            "Authentication required",
        ));
        status_response(StatusCode::UNAUTHORIZED)
    }
}

impl Middleware for SessionStage {
    fn name(&self) -> &'static str {
        "session"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut GuardContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if self.skip_paths.iter().any(|p| p == &ctx.profile().path) {
                return next.run(ctx, request).await;
            }

            let mutating = is_mutating(request.method());
            let now = chrono::Utc::now().timestamp();
            let profile = ctx.profile();
            let session_cookie = profile.session_cookie.clone();
            let bearer_token = profile.bearer_token.clone();

            let mut rotated_token = None;

            match session_cookie.as_deref() {
                Some(cookie) => match self.codec.verify(cookie, now) {
                    Ok(claims) => {
                        if self.codec.needs_rotation(&claims, now) {
                            let (token, _) = self.codec.rotate(&claims, now);
                            rotated_token = Some(token);
                        }
                        tracing::debug!(user_id = %claims.log_id(), "session verified");
                        ctx.set_claims(claims);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "session token rejected");
                        return Self::deny_invalid(ctx);
                    }
                },
                None => {
                    if mutating {
                        // Bearer or not, mutations require the cookie.
                        return Self::deny_missing(ctx);
                    }
                    if let Some(bearer) = bearer_token.as_deref() {
                        // Identification only on reads.
                        match self.codec.verify(bearer, now) {
                            Ok(claims) => ctx.set_claims(claims),
                            Err(err) => {
                                tracing::warn!(error = %err, "bearer token rejected");
                                return Self::deny_invalid(ctx);
                            }
                        }
                    }
                }
            }

            let mut response = next.run(ctx, request).await;

            if let Some(token) = rotated_token {
                let cookie = session_cookie_value(&token, self.production);
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    response.headers_mut().append(http::header::SET_COOKIE, value);
                }
            }

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Method;
    use palisade_core::ROTATION_THRESHOLD_SECS;

    fn codec() -> Arc<SessionTokenCodec> {
        Arc::new(SessionTokenCodec::new("test-secret"))
    }

    fn stage(codec: Arc<SessionTokenCodec>) -> SessionStage {
        SessionStage::new(codec, false, vec!["/auth/login".to_string()])
    }

    fn handler() -> Next<'static> {
        Next::handler(|_ctx, _req| Box::pin(async { status_response(StatusCode::OK) }))
    }

    fn request(method: Method, session: Option<&str>, bearer: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method(method).uri("/posts");
        if let Some(token) = session {
            builder = builder.header("cookie", format!("session={token}"));
        }
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_cookie_attaches_claims() {
        let codec = codec();
        let now = chrono::Utc::now().timestamp();
        let (token, _) = codec.mint("user-a", "editor", now);

        let request = request(Method::GET, Some(&token), None);
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(codec).process(&mut ctx, request, handler()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ctx.claims().unwrap().user_id, "user-a");
        assert!(!response.headers().contains_key(http::header::SET_COOKIE));
    }

    #[tokio::test]
    async fn test_tampered_cookie_is_401_on_read() {
        let codec = codec();
        let now = chrono::Utc::now().timestamp();
        let (token, _) = codec.mint("user-a", "editor", now);
        let tampered = format!("{token}ff");

        let request = request(Method::GET, Some(&tampered), None);
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(codec).process(&mut ctx, request, handler()).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ctx.denial().unwrap().message,
            "Invalid or expired authentication token"
        );
    }

    #[tokio::test]
    async fn test_missing_session_on_read_is_anonymous() {
        let request = request(Method::GET, None, None);
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(codec()).process(&mut ctx, request, handler()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(ctx.claims().is_none());
    }

    #[tokio::test]
    async fn test_missing_session_on_mutation_is_401() {
        let request = request(Method::POST, None, None);
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(codec()).process(&mut ctx, request, handler()).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ctx.denial().unwrap().message, "Authentication required");
    }

    #[tokio::test]
    async fn test_bearer_only_mutation_is_401() {
        let codec = codec();
        let now = chrono::Utc::now().timestamp();
        let (token, _) = codec.mint("user-a", "editor", now);

        let request = request(Method::POST, None, Some(&token));
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(codec).process(&mut ctx, request, handler()).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ctx.denial().unwrap().message, "Authentication required");
    }

    #[tokio::test]
    async fn test_bearer_identifies_on_read() {
        let codec = codec();
        let now = chrono::Utc::now().timestamp();
        let (token, _) = codec.mint("user-a", "editor", now);

        let request = request(Method::GET, None, Some(&token));
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(codec).process(&mut ctx, request, handler()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ctx.claims().unwrap().user_id, "user-a");
    }

    #[tokio::test]
    async fn test_fresh_token_is_not_rotated() {
        let codec = codec();
        let now = chrono::Utc::now().timestamp();
        // Just inside the rotation threshold.
        let (token, _) = codec.mint("user-a", "editor", now - ROTATION_THRESHOLD_SECS + 1);

        let request = request(Method::GET, Some(&token), None);
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(codec).process(&mut ctx, request, handler()).await;

        assert!(!response.headers().contains_key(http::header::SET_COOKIE));
    }

    #[tokio::test]
    async fn test_stale_token_rotates_with_same_identity() {
        let codec = codec();
        let now = chrono::Utc::now().timestamp();
        let (token, _) = codec.mint("user-a", "editor", now - ROTATION_THRESHOLD_SECS - 5);

        let request = request(Method::GET, Some(&token), None);
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(codec.clone()).process(&mut ctx, request, handler()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(http::header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(!cookie.contains("Secure"));

        let new_token = cookie
            .trim_start_matches("session=")
            .split(';')
            .next()
            .unwrap();
        let claims = codec.verify(new_token, now).unwrap();
        assert_eq!(claims.user_id, "user-a");
        assert_eq!(claims.role, "editor");
    }

    #[tokio::test]
    async fn test_skip_path_bypasses_authentication() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .body(Bytes::new())
            .unwrap();
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(codec()).process(&mut ctx, request, handler()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_secure_cookie_in_production() {
        let value = session_cookie_value("tok", true);
        assert!(value.ends_with("; Secure"));
        assert!(value.contains("Max-Age=86400"));
    }
}
