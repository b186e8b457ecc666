//! Rate limiting stage.
//!
//! Fixed-window request counting per `(scope, value, route bucket)` key.
//! The counter store is injected so tests get isolated state and a shared
//! backend can replace the in-memory store without touching this stage.
//!
//! ## Key Resolution
//!
//! The user scope wins whenever the request carries a verifiable session
//! cookie; the stage verifies the cookie itself, for key derivation only,
//! because authentication runs later in the pipeline. A client-asserted
//! `X-User-Id` header is never consulted. Otherwise the key falls back to
//! the client IP, honoring `X-Forwarded-For` only when the process trusts
//! its proxy.
//!
//! ## Response Headers
//!
//! `RateLimit-Limit`, `RateLimit-Remaining` and `RateLimit-Reset` are
//! stamped on every response that flows through this stage; `OPTIONS`
//! requests and 413 responses never reach it, so they never carry these
//! headers. On 429 the response additionally carries `Retry-After`.

use crate::context::GuardContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, status_response};
use http::{HeaderValue, StatusCode};
use palisade_core::{Denial, ErrorCode, SessionTokenCodec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "ratelimit-limit";
    /// Remaining requests in the current window.
    pub const REMAINING: &str = "ratelimit-remaining";
    /// Seconds until the window resets.
    pub const RESET: &str = "ratelimit-reset";
    /// Seconds to wait before retrying (on 429).
    pub const RETRY_AFTER: &str = "retry-after";
}

/// Default window length: 60 seconds.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Default request budget per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 100;

/// The scope a rate-limit key was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    /// Keyed by verified session user ID.
    User,
    /// Keyed by client IP address.
    Ip,
}

impl KeyScope {
    /// Returns the wire representation used in denial details.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ip => "ip",
        }
    }
}

/// A resolved rate-limit key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitKey {
    /// How the key was derived.
    pub scope: KeyScope,
    /// User ID or IP address.
    pub value: String,
}

impl RateLimitKey {
    /// Renders the storage key including the route bucket.
    #[must_use]
    pub fn storage_key(&self, route_bucket: &str) -> String {
        format!("{}:{}:{}", self.scope.as_str(), self.value, route_bucket)
    }
}

/// State of one fixed window after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Requests counted in the current window, this one included.
    pub count: u32,
    /// When the current window opened, epoch milliseconds.
    pub window_start_ms: u64,
}

/// Injected counter backend.
///
/// Implementations must not lose updates under concurrent increments.
pub trait RateLimitStore: Send + Sync + 'static {
    /// Counts one request against `key`, opening a new window when the
    /// current one has elapsed, and returns the resulting state.
    fn increment(&self, key: &str, window_ms: u64, now_ms: u64) -> WindowState;
}

/// In-process store: one fixed window per key behind a mutex.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    windows: Mutex<HashMap<String, WindowState>>,
}

impl InMemoryRateLimitStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn increment(&self, key: &str, window_ms: u64, now_ms: u64) -> WindowState {
        let mut windows = self.windows.lock();
        let state = windows
            .entry(key.to_string())
            .or_insert(WindowState {
                count: 0,
                window_start_ms: now_ms,
            });

        if now_ms.saturating_sub(state.window_start_ms) >= window_ms {
            state.count = 0;
            state.window_start_ms = now_ms;
        }
        state.count = state.count.saturating_add(1);
        *state
    }
}

/// Stage that enforces the fixed-window limit.
pub struct RateLimitStage {
    /// Injected counter backend.
    store: Arc<dyn RateLimitStore>,
    /// Request budget per window.
    max_requests: u32,
    /// Window length in milliseconds.
    window_ms: u64,
    /// Whether `X-Forwarded-For` is trustworthy.
    trust_proxy: bool,
    /// Codec used to verify the session cookie for key derivation only.
    codec: Arc<SessionTokenCodec>,
    /// Paths exempt from limiting (the health endpoint).
    skip_paths: Vec<String>,
}

impl std::fmt::Debug for RateLimitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitStage")
            .field("max_requests", &self.max_requests)
            .field("window_ms", &self.window_ms)
            .field("trust_proxy", &self.trust_proxy)
            .field("skip_paths", &self.skip_paths)
            .finish_non_exhaustive()
    }
}

impl RateLimitStage {
    /// Creates the rate limiter.
    #[must_use]
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        max_requests: u32,
        window_ms: u64,
        trust_proxy: bool,
        codec: Arc<SessionTokenCodec>,
        skip_paths: Vec<String>,
    ) -> Self {
        Self {
            store,
            max_requests,
            window_ms,
            trust_proxy,
            codec,
            skip_paths,
        }
    }

    /// Resolves the rate-limit key for a request.
    fn resolve_key(&self, ctx: &GuardContext, now: i64) -> RateLimitKey {
        let profile = ctx.profile();

        // Self-verified session cookie; failures fall through silently
        // because authentication proper runs later.
        if let Some(cookie) = profile.session_cookie.as_deref() {
            if let Ok(claims) = self.codec.verify(cookie, now) {
                return RateLimitKey {
                    scope: KeyScope::User,
                    value: claims.user_id,
                };
            }
        }

        let ip = if self.trust_proxy {
            profile
                .forwarded_for
                .clone()
                .or_else(|| profile.peer_addr.map(|addr| addr.to_string()))
        } else {
            profile.peer_addr.map(|addr| addr.to_string())
        };

        RateLimitKey {
            scope: KeyScope::Ip,
            value: ip.unwrap_or_else(|| "unknown".to_string()),
        }
    }

    /// Stamps the standard counters on a response.
    fn apply_headers(&self, response: &mut Response, state: WindowState, now_ms: u64) {
        let remaining = self.max_requests.saturating_sub(state.count);
        let reset_secs = self.reset_seconds(state, now_ms);

        let headers = response.headers_mut();
        headers.insert(headers::LIMIT, HeaderValue::from(self.max_requests));
        headers.insert(headers::REMAINING, HeaderValue::from(remaining));
        headers.insert(headers::RESET, HeaderValue::from(reset_secs));
    }

    /// Seconds until the current window resets, rounded up, minimum 1.
    fn reset_seconds(&self, state: WindowState, now_ms: u64) -> u64 {
        let window_end = state.window_start_ms.saturating_add(self.window_ms);
        let remaining_ms = window_end.saturating_sub(now_ms);
        remaining_ms.div_ceil(1000).max(1)
    }
}

impl Middleware for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
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

            let now_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
            let now_secs = i64::try_from(now_ms / 1000).unwrap_or(0);

            let key = self.resolve_key(ctx, now_secs);
            let storage_key = key.storage_key(ctx.profile().route_bucket());
            let state = self.store.increment(&storage_key, self.window_ms, now_ms);

            if state.count > self.max_requests {
                let retry_after = self.reset_seconds(state, now_ms);
                let window_secs = self.window_ms / 1000;

                tracing::warn!(
                    scope = key.scope.as_str(),
                    route = ctx.profile().route_bucket(),
                    count = state.count,
                    limit = self.max_requests,
                    "rate limit exceeded"
                );

                ctx.set_denial(
                    Denial::new(ErrorCode::RateLimited, "Too many requests").with_details(vec![
                        serde_json::json!({
                            "scope": key.scope.as_str(),
                            "limit": format!(
                                "{} requests per {} seconds",
                                self.max_requests, window_secs
                            ),
                            "retryAfterSeconds": retry_after,
                        }),
                    ]),
                );

                let mut response = status_response(StatusCode::TOO_MANY_REQUESTS);
                self.apply_headers(&mut response, state, now_ms);
                response
                    .headers_mut()
                    .insert(headers::RETRY_AFTER, HeaderValue::from(retry_after));
                return response;
            }

            let mut response = next.run(ctx, request).await;
            self.apply_headers(&mut response, state, now_ms);
            response
        })
    }
}
