//! CORS policy engine.
//!
//! Decides the allowed origin and credentials for every request and
//! terminates all `OPTIONS` requests with 204 before any later gate runs.
//! Misconfiguration fails the whole request rather than degrading:
//! a wildcard allowlist in production is terminal 500 for every request,
//! preflight included.
//!
//! ## Headers
//!
//! - `Access-Control-Allow-Origin`: the echoed origin when allowed, never
//!   `*` when credentials are involved
//! - `Access-Control-Allow-Credentials`: only for exact allowlist matches
//! - `Vary: Origin` always, plus the preflight request headers when present
//! - Preflight additionally gets `Allow-Methods`, `Allow-Headers`,
//!   `Expose-Headers` and `Access-Control-Max-Age: 600`
//!
//! A present-but-unlisted origin is not a server-side failure: the allow
//! header is simply omitted and the browser enforces the block.

use crate::context::GuardContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, status_response};
use http::{HeaderValue, Method, StatusCode};
use palisade_core::{Denial, ErrorCode};

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Expose-Headers` header.
    pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// Methods advertised on preflight responses.
const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";

/// Superset of every header any gate in the pipeline reads.
const ALLOWED_HEADERS: &str =
    "Authorization, Content-Type, X-CSRF-Token, X-Request-Id, X-User-Id, X-User-Role";

/// Headers browsers may surface to scripts.
const EXPOSED_HEADERS: &str =
    "RateLimit-Limit, RateLimit-Remaining, RateLimit-Reset, Retry-After, X-Request-Id";

/// Preflight cache duration in seconds.
const MAX_AGE_SECS: u32 = 600;

/// The set of allowed origins.
#[derive(Debug, Clone)]
pub enum AllowedOrigins {
    /// Allow any origin (`CORS_ORIGINS=*`); forbidden in production.
    Any,
    /// Exact-match allowlist.
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Checks whether an origin is allowed.
    #[must_use]
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.iter().any(|o| o == origin),
        }
    }

    /// True for an exact allowlist match, which alone may carry credentials.
    #[must_use]
    pub fn is_exact_match(&self, origin: &str) -> bool {
        matches!(self, Self::List(origins) if origins.iter().any(|o| o == origin))
    }
}

/// The per-request CORS decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsDecision {
    /// The origin to echo, when allowed.
    pub allow_origin: Option<String>,
    /// Whether credentials may accompany the allowed origin.
    pub allow_credentials: bool,
    /// Whether this request is a preflight.
    pub is_preflight: bool,
}

/// Stage that evaluates origin policy and terminates preflight.
#[derive(Debug, Clone)]
pub struct CorsStage {
    /// Allowed origins.
    origins: AllowedOrigins,
    /// Whether exact-match origins may carry credentials.
    allow_credentials: bool,
    /// Whether `Origin: null` is tolerated (never in production).
    allow_null_origin: bool,
    /// Production-like deployment mode.
    production: bool,
}

impl CorsStage {
    /// Creates the CORS stage.
    #[must_use]
    pub fn new(
        origins: AllowedOrigins,
        allow_credentials: bool,
        allow_null_origin: bool,
        production: bool,
    ) -> Self {
        Self {
            origins,
            allow_credentials,
            allow_null_origin,
            production,
        }
    }

    /// Wildcard origins in production are a fatal misconfiguration.
    fn is_misconfigured(&self) -> bool {
        self.production && matches!(self.origins, AllowedOrigins::Any)
    }

    /// Evaluates the origin policy for a request.
    fn decide(&self, origin: Option<&str>, is_preflight: bool) -> CorsDecision {
        let Some(origin) = origin else {
            return CorsDecision {
                allow_origin: None,
                allow_credentials: false,
                is_preflight,
            };
        };

        if self.origins.is_allowed(origin) {
            // Credentials only ever pair with an exact allowlist match.
            let allow_credentials =
                self.allow_credentials && self.origins.is_exact_match(origin);
            CorsDecision {
                allow_origin: Some(origin.to_string()),
                allow_credentials,
                is_preflight,
            }
        } else {
            // Unlisted origin: omit the allow header, let the browser block.
            CorsDecision {
                allow_origin: None,
                allow_credentials: false,
                is_preflight,
            }
        }
    }

    /// Applies the decision headers shared by preflight and plain responses.
    fn apply_decision(response: &mut Response, decision: &CorsDecision) {
        if let Some(origin) = &decision.allow_origin {
            if let Ok(value) = HeaderValue::from_str(origin) {
                response.headers_mut().insert(headers::ALLOW_ORIGIN, value);
            }
        }
        if decision.allow_credentials {
            response
                .headers_mut()
                .insert(headers::ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
    }

    /// Sets the `Vary` header for origin-dependent caching.
    fn apply_vary(response: &mut Response, had_acrm: bool, had_acrh: bool) {
        let mut vary = String::from("Origin");
        if had_acrm {
            vary.push_str(", Access-Control-Request-Method");
        }
        if had_acrh {
            vary.push_str(", Access-Control-Request-Headers");
        }
        if let Ok(value) = HeaderValue::from_str(&vary) {
            response.headers_mut().insert(headers::VARY, value);
        }
    }

    /// Builds the terminal 204 preflight response.
    fn preflight_response(decision: &CorsDecision, had_acrm: bool, had_acrh: bool) -> Response {
        let mut response = status_response(StatusCode::NO_CONTENT);
        Self::apply_decision(&mut response, decision);
        Self::apply_vary(&mut response, had_acrm, had_acrh);

        let headers = response.headers_mut();
        headers.insert(
            headers::ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            headers::ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        headers.insert(
            headers::EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSED_HEADERS),
        );
        headers.insert(headers::MAX_AGE, HeaderValue::from(MAX_AGE_SECS));

        response
    }
}

impl Middleware for CorsStage {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut GuardContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let is_options = request.method() == Method::OPTIONS;
            let profile = ctx.profile();
            let origin = profile.origin.clone();
            let had_acrm = profile.access_control_request_method.is_some();
            let had_acrh = profile.access_control_request_headers.is_some();

            if self.is_misconfigured() {
                // Applies to preflight and normal requests alike.
                ctx.set_denial(Denial::new(
                    ErrorCode::InvalidCorsConfig,
                    "Wildcard CORS origins are not allowed in production",
                ));
                let mut response = status_response(StatusCode::INTERNAL_SERVER_ERROR);
                Self::apply_vary(&mut response, had_acrm, had_acrh);
                return response;
            }

            if origin.as_deref() == Some("null")
                && !(self.allow_null_origin && !self.production)
            {
                ctx.set_denial(Denial::new(
                    ErrorCode::ForbiddenNullOrigin,
                    "Requests from a null origin are not allowed",
                ));
                let mut response = status_response(StatusCode::FORBIDDEN);
                Self::apply_vary(&mut response, had_acrm, had_acrh);
                return response;
            }

            let decision = self.decide(origin.as_deref(), is_options);

            if is_options {
                // Terminal: no rate-limit, auth, or CSRF stage ever runs.
                return Self::preflight_response(&decision, had_acrm, had_acrh);
            }

            let mut response = next.run(ctx, request).await;
            Self::apply_decision(&mut response, &decision);
            Self::apply_vary(&mut response, had_acrm, had_acrh);
            response
                .headers_mut()
                .insert(headers::EXPOSE_HEADERS, HeaderValue::from_static(EXPOSED_HEADERS));
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn stage(origins: AllowedOrigins, production: bool) -> CorsStage {
        CorsStage::new(origins, true, false, production)
    }

    fn allowlist() -> AllowedOrigins {
        AllowedOrigins::List(vec!["http://localhost:3000".to_string()])
    }

    fn handler() -> Next<'static> {
        Next::handler(|_ctx, _req| {
            Box::pin(async { status_response(StatusCode::OK) })
        })
    }

    fn preflight_request(origin: &str) -> Request {
        http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/posts")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .body(Bytes::new())
            .unwrap()
    }

    fn get_request(origin: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method(Method::GET).uri("/posts");
        if let Some(origin) = origin {
            builder = builder.header("origin", origin);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn test_preflight_is_terminal_204() {
        let request = preflight_request("http://localhost:3000");
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(allowlist(), false)
            .process(&mut ctx, request, handler())
            .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(headers::ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            response.headers().get(headers::ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
        assert_eq!(response.headers().get(headers::MAX_AGE).unwrap(), "600");
        assert!(!response.headers().contains_key("ratelimit-limit"));
        assert!(!response.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn test_preflight_vary_includes_request_headers() {
        let request = preflight_request("http://localhost:3000");
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(allowlist(), false)
            .process(&mut ctx, request, handler())
            .await;

        let vary = response.headers().get(headers::VARY).unwrap().to_str().unwrap();
        assert!(vary.contains("Origin"));
        assert!(vary.contains("Access-Control-Request-Method"));
    }

    #[tokio::test]
    async fn test_wildcard_in_production_fails_every_request() {
        for request in [preflight_request("http://localhost:3000"), get_request(None)] {
            let mut ctx = GuardContext::for_request(&request);
            let response = stage(AllowedOrigins::Any, true)
                .process(&mut ctx, request, handler())
                .await;

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(ctx.denial().unwrap().code, ErrorCode::InvalidCorsConfig);
        }
    }

    #[tokio::test]
    async fn test_wildcard_in_production_failure_still_varies_on_origin() {
        let request = get_request(Some("http://localhost:3000"));
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(AllowedOrigins::Any, true)
            .process(&mut ctx, request, handler())
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(headers::VARY).unwrap(), "Origin");
    }

    #[tokio::test]
    async fn test_null_origin_denied_by_default() {
        let request = get_request(Some("null"));
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(allowlist(), false)
            .process(&mut ctx, request, handler())
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(ctx.denial().unwrap().code, ErrorCode::ForbiddenNullOrigin);
    }

    #[tokio::test]
    async fn test_null_origin_denied_in_production_despite_flag() {
        let request = get_request(Some("null"));
        let mut ctx = GuardContext::for_request(&request);

        let response = CorsStage::new(allowlist(), true, true, true)
            .process(&mut ctx, request, handler())
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_null_origin_allowed_with_flag_in_dev() {
        let request = get_request(Some("null"));
        let mut ctx = GuardContext::for_request(&request);

        let response = CorsStage::new(allowlist(), true, true, false)
            .process(&mut ctx, request, handler())
            .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unlisted_origin_continues_without_allow_header() {
        let request = get_request(Some("http://evil.example"));
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(allowlist(), false)
            .process(&mut ctx, request, handler())
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(headers::ALLOW_ORIGIN));
        assert!(!response.headers().contains_key(headers::ALLOW_CREDENTIALS));
    }

    #[tokio::test]
    async fn test_allowed_origin_echoed_with_credentials() {
        let request = get_request(Some("http://localhost:3000"));
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(allowlist(), false)
            .process(&mut ctx, request, handler())
            .await;

        assert_eq!(
            response.headers().get(headers::ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            response.headers().get(headers::ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
        assert_eq!(response.headers().get(headers::VARY).unwrap(), "Origin");
    }

    #[tokio::test]
    async fn test_wildcard_in_dev_echoes_origin_without_credentials() {
        let request = get_request(Some("http://anything.example"));
        let mut ctx = GuardContext::for_request(&request);

        let response = stage(AllowedOrigins::Any, false)
            .process(&mut ctx, request, handler())
            .await;

        assert_eq!(
            response.headers().get(headers::ALLOW_ORIGIN).unwrap(),
            "http://anything.example"
        );
        assert!(!response.headers().contains_key(headers::ALLOW_CREDENTIALS));
    }
}
