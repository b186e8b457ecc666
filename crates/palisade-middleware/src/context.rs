//! Guard context types.
//!
//! The [`GuardContext`] carries per-request state through the pipeline:
//! correlation IDs, the parsed [`RequestProfile`], the verified session
//! claims once the authenticator has run, and the structured [`Denial`]
//! recorded by whichever stage short-circuits.
//!
//! The profile is populated exactly once at pipeline entry so that no
//! stage re-parses headers from the raw request.

use crate::types::{PeerAddr, Request};
use http::Method;
use palisade_core::{Denial, RequestId, SessionClaims, TraceContext};
use std::net::IpAddr;
use std::time::Instant;

/// All request attributes the guard stages consume, resolved up front.
///
/// Header values that fail UTF-8 conversion are treated as absent; every
/// gate fails closed on absence where presence is required.
#[derive(Debug, Clone, Default)]
pub struct RequestProfile {
    /// Request path (no query string).
    pub path: String,
    /// The `Origin` header, verbatim (may be the literal `"null"`).
    pub origin: Option<String>,
    /// `Access-Control-Request-Method` (preflight).
    pub access_control_request_method: Option<String>,
    /// `Access-Control-Request-Headers` (preflight).
    pub access_control_request_headers: Option<String>,
    /// The `Content-Type` header.
    pub content_type: Option<String>,
    /// The `Accept` header.
    pub accept: Option<String>,
    /// Buffered body length in bytes.
    pub content_length: usize,
    /// The `session` cookie value.
    pub session_cookie: Option<String>,
    /// The `csrf` cookie value.
    pub csrf_cookie: Option<String>,
    /// The `X-CSRF-Token` header.
    pub csrf_header: Option<String>,
    /// The `X-User-Id` header.
    pub user_id_header: Option<String>,
    /// The `X-User-Role` header.
    pub user_role_header: Option<String>,
    /// Bearer token from the `Authorization` header, if any.
    pub bearer_token: Option<String>,
    /// First entry of `X-Forwarded-For`, if present.
    pub forwarded_for: Option<String>,
    /// The client socket address, when the server provided one.
    pub peer_addr: Option<IpAddr>,
    /// The `X-Request-Id` header.
    pub request_id_header: Option<String>,
    /// The `traceparent` header.
    pub traceparent: Option<String>,
    /// The `x-trace-id` header.
    pub x_trace_id: Option<String>,
}

impl RequestProfile {
    /// Resolves the profile from a buffered request.
    #[must_use]
    pub fn from_request(request: &Request) -> Self {
        let header = |name: &str| -> Option<String> {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let cookies = header("cookie");
        let session_cookie = cookies.as_deref().and_then(|c| cookie_value(c, "session"));
        let csrf_cookie = cookies.as_deref().and_then(|c| cookie_value(c, "csrf"));

        let bearer_token = header("authorization").and_then(|v| {
            v.strip_prefix("Bearer ")
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        });

        let forwarded_for = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .filter(|ip| !ip.is_empty());

        Self {
            path: request.uri().path().to_string(),
            origin: header("origin"),
            access_control_request_method: header("access-control-request-method"),
            access_control_request_headers: header("access-control-request-headers"),
            content_type: header("content-type"),
            accept: header("accept"),
            content_length: request.body().len(),
            session_cookie,
            csrf_cookie,
            csrf_header: header("x-csrf-token"),
            user_id_header: header("x-user-id"),
            user_role_header: header("x-user-role"),
            bearer_token,
            forwarded_for,
            peer_addr: request.extensions().get::<PeerAddr>().map(|p| p.0),
            request_id_header: header("x-request-id"),
            traceparent: header("traceparent"),
            x_trace_id: header("x-trace-id"),
        }
    }

    /// Returns the first path segment, used as the rate-limit route bucket.
    #[must_use]
    pub fn route_bucket(&self) -> &str {
        self.path.trim_start_matches('/').split('/').next().unwrap_or("")
    }
}

/// Parses a single cookie value out of a `Cookie` header.
fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k.trim() == name {
            Some(v.trim().to_string())
        } else {
            None
        }
    })
}

/// Returns true for methods that mutate state.
#[must_use]
pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Context that flows through the guard pipeline.
///
/// Mutable during processing: the correlation stage sets IDs, the session
/// authenticator attaches claims, and any stage may record a [`Denial`]
/// before short-circuiting.
#[derive(Debug)]
pub struct GuardContext {
    /// Unique identifier for this request.
    request_id: RequestId,

    /// Best-effort distributed-trace correlation.
    trace: TraceContext,

    /// Parsed request attributes.
    profile: RequestProfile,

    /// Verified session claims, once authentication has run.
    claims: Option<SessionClaims>,

    /// Structured denial recorded by a short-circuiting stage.
    denial: Option<Denial>,

    /// When the request started processing.
    started_at: Instant,
}

impl GuardContext {
    /// Creates a context for a request, resolving the profile once.
    #[must_use]
    pub fn for_request(request: &Request) -> Self {
        Self {
            request_id: RequestId::new(),
            trace: TraceContext::default(),
            profile: RequestProfile::from_request(request),
            claims: None,
            denial: None,
            started_at: Instant::now(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Sets the request ID.
    ///
    /// This should only be called by the correlation stage.
    pub fn set_request_id(&mut self, request_id: RequestId) {
        self.request_id = request_id;
    }

    /// Returns the trace context.
    #[must_use]
    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// Sets the trace context.
    ///
    /// This should only be called by the correlation stage.
    pub fn set_trace(&mut self, trace: TraceContext) {
        self.trace = trace;
    }

    /// Returns the parsed request profile.
    #[must_use]
    pub fn profile(&self) -> &RequestProfile {
        &self.profile
    }

    /// Returns the verified session claims, if authentication has run.
    #[must_use]
    pub fn claims(&self) -> Option<&SessionClaims> {
        self.claims.as_ref()
    }

    /// Attaches verified session claims.
    ///
    /// This should only be called by the session authenticator.
    pub fn set_claims(&mut self, claims: SessionClaims) {
        self.claims = Some(claims);
    }

    /// Returns the recorded denial, if any stage short-circuited.
    #[must_use]
    pub fn denial(&self) -> Option<&Denial> {
        self.denial.as_ref()
    }

    /// Records a structured denial for the envelope formatter.
    pub fn set_denial(&mut self, denial: Denial) {
        self.denial = Some(denial);
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use palisade_core::ErrorCode;

    fn request() -> Request {
        http::Request::builder()
            .method(Method::POST)
            .uri("/posts/123?expand=1")
            .header("origin", "http://localhost:3000")
            .header("content-type", "application/json; charset=utf-8")
            .header("accept", "application/json")
            .header("cookie", "session=v1.abc.def; csrf=1700-aa; other=x")
            .header("x-csrf-token", "1700-aa")
            .header("x-user-id", "user-a")
            .header("x-user-role", "editor")
            .header("authorization", "Bearer tok-123")
            .header("x-forwarded-for", "10.0.0.9, 172.16.0.1")
            .body(Bytes::from_static(b"{\"title\":\"T\"}"))
            .unwrap()
    }

    #[test]
    fn test_profile_resolves_everything_once() {
        let profile = RequestProfile::from_request(&request());

        assert_eq!(profile.path, "/posts/123");
        assert_eq!(profile.origin.as_deref(), Some("http://localhost:3000"));
        assert_eq!(
            profile.content_type.as_deref(),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(profile.content_length, 13);
        assert_eq!(profile.session_cookie.as_deref(), Some("v1.abc.def"));
        assert_eq!(profile.csrf_cookie.as_deref(), Some("1700-aa"));
        assert_eq!(profile.csrf_header.as_deref(), Some("1700-aa"));
        assert_eq!(profile.user_id_header.as_deref(), Some("user-a"));
        assert_eq!(profile.user_role_header.as_deref(), Some("editor"));
        assert_eq!(profile.bearer_token.as_deref(), Some("tok-123"));
        assert_eq!(profile.forwarded_for.as_deref(), Some("10.0.0.9"));
    }

    #[test]
    fn test_route_bucket_is_first_segment() {
        let profile = RequestProfile::from_request(&request());
        assert_eq!(profile.route_bucket(), "posts");
    }

    #[test]
    fn test_cookie_value_parsing() {
        assert_eq!(
            cookie_value("a=1; session=tok; b=2", "session").as_deref(),
            Some("tok")
        );
        assert_eq!(cookie_value("a=1; b=2", "session"), None);
        assert_eq!(cookie_value("session=", "session").as_deref(), Some(""));
    }

    #[test]
    fn test_is_mutating() {
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::PUT));
        assert!(is_mutating(&Method::PATCH));
        assert!(is_mutating(&Method::DELETE));
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::OPTIONS));
        assert!(!is_mutating(&Method::HEAD));
    }

    #[test]
    fn test_context_denial_slot() {
        let req = request();
        let mut ctx = GuardContext::for_request(&req);
        assert!(ctx.denial().is_none());

        ctx.set_denial(Denial::new(ErrorCode::Forbidden, "denied"));
        assert_eq!(ctx.denial().unwrap().code, ErrorCode::Forbidden);
    }

    #[test]
    fn test_context_claims_slot() {
        let req = request();
        let mut ctx = GuardContext::for_request(&req);
        assert!(ctx.claims().is_none());

        ctx.set_claims(SessionClaims {
            user_id: "user-a".to_string(),
            role: "editor".to_string(),
            issued_at: 0,
            expires_at: 10,
            auth_time: None,
        });
        assert_eq!(ctx.claims().unwrap().user_id, "user-a");
    }

    #[test]
    fn test_bearer_requires_prefix() {
        let req = http::Request::builder()
            .uri("/posts")
            .header("authorization", "Basic dXNlcjpwYXNz")
            .body(Bytes::new())
            .unwrap();
        let profile = RequestProfile::from_request(&req);
        assert!(profile.bearer_token.is_none());
    }
}
