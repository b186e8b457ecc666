//! Correlation context types.
//!
//! Every request that enters the guard pipeline is assigned a [`RequestId`]
//! (generated or propagated from `X-Request-Id`) and a best-effort
//! [`TraceContext`] resolved from the W3C `traceparent` header or the
//! legacy `x-trace-id` header. Both are attached to every response,
//! including terminal denials.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for request tracking
/// and log correlation.
///
/// # Example
///
/// ```
/// use palisade_core::RequestId;
///
/// let id = RequestId::new();
/// println!("Request ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    ///
    /// This is useful when a trusted client already assigned an ID via
    /// the `X-Request-Id` header.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<RequestId> for Uuid {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

/// Distributed-trace correlation resolved from inbound headers.
///
/// The trace ID is best-effort: it is taken from a well-formed W3C
/// `traceparent` header if present, falling back to `x-trace-id`, and
/// absent otherwise. The guard pipeline never generates trace IDs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceContext {
    /// 32-hex-char trace ID, if the caller supplied one.
    pub trace_id: Option<String>,
    /// The raw `traceparent` header value, echoed on responses.
    pub traceparent: Option<String>,
}

impl TraceContext {
    /// Resolves a trace context from raw header values.
    ///
    /// `traceparent` wins over `x-trace-id` when both parse. A malformed
    /// `traceparent` is ignored rather than rejected; correlation is not
    /// a gate.
    #[must_use]
    pub fn resolve(traceparent: Option<&str>, x_trace_id: Option<&str>) -> Self {
        if let Some(raw) = traceparent {
            if let Some(trace_id) = Self::parse_traceparent(raw) {
                return Self {
                    trace_id: Some(trace_id),
                    traceparent: Some(raw.to_string()),
                };
            }
        }

        let trace_id = x_trace_id
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().to_string());

        Self {
            trace_id,
            traceparent: None,
        }
    }

    /// Parses the trace-id field out of a W3C `traceparent` value.
    ///
    /// Format: `version "-" trace-id "-" parent-id "-" flags`, where
    /// trace-id is 32 lowercase hex chars and must not be all zeros.
    fn parse_traceparent(raw: &str) -> Option<String> {
        let mut parts = raw.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_id = parts.next()?;
        let flags = parts.next()?;

        if parts.next().is_some() {
            return None;
        }
        if version.len() != 2 || !version.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        if trace_id.len() != 32
            || !trace_id
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return None;
        }
        if trace_id.chars().all(|c| c == '0') {
            return None;
        }
        if parent_id.len() != 16 || flags.len() != 2 {
            return None;
        }

        Some(trace_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_is_v7() {
        let id = RequestId::new();
        assert_eq!(id.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn test_request_id_roundtrip() {
        let uuid = Uuid::now_v7();
        let id = RequestId::from_uuid(uuid);
        assert_eq!(Uuid::from(id), uuid);
        assert_eq!(id.to_string(), uuid.to_string());
    }

    #[test]
    fn test_resolve_from_traceparent() {
        let ctx = TraceContext::resolve(
            Some("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"),
            None,
        );
        assert_eq!(
            ctx.trace_id.as_deref(),
            Some("0af7651916cd43dd8448eb211c80319c")
        );
        assert!(ctx.traceparent.is_some());
    }

    #[test]
    fn test_traceparent_wins_over_x_trace_id() {
        let ctx = TraceContext::resolve(
            Some("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"),
            Some("other-trace"),
        );
        assert_eq!(
            ctx.trace_id.as_deref(),
            Some("0af7651916cd43dd8448eb211c80319c")
        );
    }

    #[test]
    fn test_malformed_traceparent_falls_back() {
        let ctx = TraceContext::resolve(Some("not-a-traceparent"), Some("legacy-id"));
        assert_eq!(ctx.trace_id.as_deref(), Some("legacy-id"));
        assert!(ctx.traceparent.is_none());
    }

    #[test]
    fn test_all_zero_trace_id_rejected() {
        let ctx = TraceContext::resolve(
            Some("00-00000000000000000000000000000000-b7ad6b7169203331-01"),
            None,
        );
        assert!(ctx.trace_id.is_none());
    }

    #[test]
    fn test_absent_headers_yield_empty_context() {
        let ctx = TraceContext::resolve(None, None);
        assert!(ctx.trace_id.is_none());
        assert!(ctx.traceparent.is_none());
    }
}
