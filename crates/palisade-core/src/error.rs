//! Error taxonomy and the JSON error envelope.
//!
//! Every terminal decision in the guard pipeline carries a stable
//! [`ErrorCode`] for programmatic handling plus a human-readable message.
//! The envelope formatter renders them as:
//!
//! ```json
//! {
//!   "code": "FORBIDDEN",
//!   "message": "Identity header does not match authenticated user",
//!   "requestId": "0192d3...",
//!   "traceId": "0af7651916cd43dd8448eb211c80319c",
//!   "hint": "...",
//!   "details": [{ "...": "..." }]
//! }
//! ```
//!
//! `requestId` is always present; `traceId`, `hint`, and `details` are
//! best-effort. All non-2xx responses additionally carry
//! `Cache-Control: no-store`.

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Stable machine-readable codes for every terminal pipeline decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Wildcard origins combined with credentials in production;
    /// misconfiguration must never silently degrade security.
    InvalidCorsConfig,
    /// `Origin: null` denied by policy.
    ForbiddenNullOrigin,
    /// Request body exceeds the configured limit.
    PayloadTooLarge,
    /// Mutating request body is not `application/json`.
    UnsupportedMediaType,
    /// The caller cannot accept `application/json`.
    NotAcceptable,
    /// Fixed-window rate limit exceeded; retriable after `Retry-After`.
    RateLimited,
    /// Missing, invalid, or expired credentials.
    Unauthorized,
    /// Authenticated but denied; the message names the specific cause.
    Forbidden,
    /// Request body failed schema validation.
    ValidationError,
    /// No route or resource matches the request.
    NotFound,
    /// Downstream dependency is in read-only or degraded mode.
    ServiceUnavailable,
    /// Unexpected failure; details are never exposed to the caller.
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status for this code.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::InvalidCorsConfig | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ForbiddenNullOrigin | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns the wire representation of this code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidCorsConfig => "INVALID_CORS_CONFIG",
            Self::ForbiddenNullOrigin => "FORBIDDEN_NULL_ORIGIN",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            Self::NotAcceptable => "NOT_ACCEPTABLE",
            Self::RateLimited => "RATE_LIMITED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Best-effort mapping from a bare HTTP status, for responses that
    /// reached the envelope formatter without structured denial data.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            406 => Self::NotAcceptable,
            413 => Self::PayloadTooLarge,
            415 => Self::UnsupportedMediaType,
            422 => Self::ValidationError,
            429 => Self::RateLimited,
            503 => Self::ServiceUnavailable,
            _ => Self::InternalError,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured terminal decision produced by a pipeline stage.
///
/// A denial is data, not an `Err`: it is a well-formed HTTP outcome that
/// the envelope formatter renders once correlation context is known.
#[derive(Debug, Clone, PartialEq)]
pub struct Denial {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Human-readable cause.
    pub message: String,
    /// Optional remediation hint (e.g. the required media type).
    pub hint: Option<String>,
    /// Optional structured detail objects.
    pub details: Option<Vec<serde_json::Value>>,
}

impl Denial {
    /// Creates a denial with a code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
            details: None,
        }
    }

    /// Attaches a remediation hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: Vec<serde_json::Value>) -> Self {
        self.details = Some(details);
        self
    }

    /// Returns the HTTP status for this denial.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.code.status()
    }
}

/// The serialized JSON body of every non-2xx pipeline response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable cause.
    pub message: String,
    /// Correlation ID, always present (generated when absent).
    #[serde(rename = "requestId")]
    pub request_id: String,
    /// Best-effort trace ID from `traceparent` / `x-trace-id`.
    #[serde(rename = "traceId", skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Optional structured detail objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl ErrorEnvelope {
    /// Builds an envelope from a denial plus correlation context.
    #[must_use]
    pub fn from_denial(denial: &Denial, request_id: &str, trace_id: Option<&str>) -> Self {
        Self {
            code: denial.code.as_str().to_string(),
            message: denial.message.clone(),
            request_id: request_id.to_string(),
            trace_id: trace_id.map(String::from),
            hint: denial.hint.clone(),
            details: denial.details.clone(),
        }
    }

    /// Serializes the envelope to its JSON wire form.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("envelope serializes")
    }
}
