//! Liveness endpoint.

use http::StatusCode;

use palisade_middleware::types::{json_response, Response};

/// `GET /health`.
///
/// Exempt from rate limiting so orchestrator probes never burn user quota.
#[must_use]
pub fn health_response() -> Response {
    json_response(StatusCode::OK, r#"{"status":"ok"}"#.to_string())
}
