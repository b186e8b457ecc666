//! Caller identity types.
//!
//! [`SessionClaims`] is the verified identity extracted from a signed
//! session token. [`IdentityAssertion`] is the *unverified* identity a
//! BFF caller asserts via `X-User-Id`/`X-User-Role` headers; the identity
//! propagation guard cross-checks the two and denies on any difference.

use serde::{Deserialize, Serialize};

/// Verified claims carried by a signed session token.
///
/// Claims are immutable once issued; rotation mints a fresh token with the
/// same `(user_id, role)` pair and new timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// The authenticated user's identifier.
    #[serde(rename = "userId")]
    pub user_id: String,

    /// The authenticated user's role.
    pub role: String,

    /// When the token was issued (epoch seconds).
    #[serde(rename = "issuedAt")]
    pub issued_at: i64,

    /// When the token expires (epoch seconds).
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,

    /// When the user last completed an interactive authentication
    /// (epoch seconds), if known.
    #[serde(rename = "authTime", skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
}

impl SessionClaims {
    /// Returns a string identifier suitable for logging.
    ///
    /// Never includes token material or other secrets.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("user:{}", self.user_id)
    }

    /// Returns the token age in seconds at time `now`.
    ///
    /// Negative ages (token from the future) are clamped to zero.
    #[must_use]
    pub fn age_seconds(&self, now: i64) -> i64 {
        (now - self.issued_at).max(0)
    }
}

/// Caller-asserted identity read from propagation headers.
///
/// Never trusted on its own: the guard denies the request unless both
/// fields equal the verified [`SessionClaims`] exactly. Record ownership
/// downstream is always resolved from the session, never from these
/// headers or from request-body fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityAssertion {
    /// Value of the `X-User-Id` header.
    pub user_id: String,
    /// Value of the `X-User-Role` header.
    pub role: String,
}

impl IdentityAssertion {
    /// Returns true when the assertion matches the verified claims exactly.
    #[must_use]
    pub fn matches(&self, claims: &SessionClaims) -> bool {
        self.user_id == claims.user_id && self.role == claims.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> SessionClaims {
        SessionClaims {
            user_id: "user-a".to_string(),
            role: "editor".to_string(),
            issued_at: 1_700_000_000,
            expires_at: 1_700_086_400,
            auth_time: None,
        }
    }

    #[test]
    fn test_log_id_redacts_everything_but_user_id() {
        assert_eq!(claims().log_id(), "user:user-a");
    }

    #[test]
    fn test_age_seconds() {
        let c = claims();
        assert_eq!(c.age_seconds(1_700_000_090), 90);
        // Future-dated tokens clamp to zero rather than going negative
        assert_eq!(c.age_seconds(1_699_999_999), 0);
    }

    #[test]
    fn test_assertion_matches() {
        let assertion = IdentityAssertion {
            user_id: "user-a".to_string(),
            role: "editor".to_string(),
        };
        assert!(assertion.matches(&claims()));
    }

    #[test]
    fn test_assertion_rejects_wrong_user() {
        let assertion = IdentityAssertion {
            user_id: "user-b".to_string(),
            role: "editor".to_string(),
        };
        assert!(!assertion.matches(&claims()));
    }

    #[test]
    fn test_assertion_rejects_wrong_role() {
        let assertion = IdentityAssertion {
            user_id: "user-a".to_string(),
            role: "admin".to_string(),
        };
        assert!(!assertion.matches(&claims()));
    }

    #[test]
    fn test_claims_serde_uses_camel_case() {
        let json = serde_json::to_value(claims()).unwrap();
        assert!(json.get("userId").is_some());
        assert!(json.get("issuedAt").is_some());
        assert!(json.get("expiresAt").is_some());
        assert!(json.get("authTime").is_none());
    }
}
