//! Signed session tokens.
//!
//! A session token is three dot-separated parts:
//!
//! ```text
//! v1.<base64url(JSON claims)>.<hex HMAC-SHA256(secret, "v1." + payload)>
//! ```
//!
//! Tokens are immutable once minted. The session authenticator re-mints a
//! token with the same `(user_id, role)` when its age crosses the rotation
//! threshold; client-side cookie clearing is the only revocation mechanism.
//!
//! Signature verification uses constant-time comparison to avoid leaking
//! tag prefixes through timing.

use crate::identity::SessionClaims;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Token format version tag; first dot-separated part of every token.
const TOKEN_VERSION: &str = "v1";

/// Default session lifetime in seconds (24 hours).
pub const SESSION_TTL_SECS: i64 = 86_400;

/// Age past which a valid token is re-minted on the next request (10 minutes).
pub const ROTATION_THRESHOLD_SECS: i64 = 600;

/// Reasons a presented token fails verification.
///
/// All variants collapse to the same client-facing 401; the distinction
/// exists for audit logging only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// The token does not have the `v1.payload.signature` structure.
    #[error("malformed session token")]
    Malformed,

    /// The signature does not match the payload.
    #[error("session token signature mismatch")]
    BadSignature,

    /// The token is structurally valid but past its expiry.
    #[error("session token expired")]
    Expired,
}

/// Mints and verifies signed session tokens with a symmetric secret.
#[derive(Clone)]
pub struct SessionTokenCodec {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SessionTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("SessionTokenCodec").finish_non_exhaustive()
    }
}

impl SessionTokenCodec {
    /// Creates a codec from the shared session secret.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Mints a token for `(user_id, role)` issued at `now` with the
    /// default TTL.
    #[must_use]
    pub fn mint(&self, user_id: &str, role: &str, now: i64) -> (String, SessionClaims) {
        self.mint_with_ttl(user_id, role, now, SESSION_TTL_SECS)
    }

    /// Mints a token with an explicit TTL in seconds.
    #[must_use]
    pub fn mint_with_ttl(
        &self,
        user_id: &str,
        role: &str,
        now: i64,
        ttl_secs: i64,
    ) -> (String, SessionClaims) {
        let claims = SessionClaims {
            user_id: user_id.to_string(),
            role: role.to_string(),
            issued_at: now,
            expires_at: now + ttl_secs,
            auth_time: Some(now),
        };
        (self.encode(&claims), claims)
    }

    /// Re-mints a token for the same `(user_id, role)` with fresh
    /// timestamps, preserving the original `auth_time`.
    #[must_use]
    pub fn rotate(&self, claims: &SessionClaims, now: i64) -> (String, SessionClaims) {
        let rotated = SessionClaims {
            user_id: claims.user_id.clone(),
            role: claims.role.clone(),
            issued_at: now,
            expires_at: now + SESSION_TTL_SECS,
            auth_time: claims.auth_time,
        };
        (self.encode(&rotated), rotated)
    }

    /// Returns true when a valid token is old enough to be re-minted.
    #[must_use]
    pub fn needs_rotation(&self, claims: &SessionClaims, now: i64) -> bool {
        claims.age_seconds(now) > ROTATION_THRESHOLD_SECS
    }

    /// Verifies a token's structure, signature, and expiry.
    pub fn verify(&self, token: &str, now: i64) -> Result<SessionClaims, TokenError> {
        let mut parts = token.splitn(3, '.');
        let version = parts.next().ok_or(TokenError::Malformed)?;
        let payload = parts.next().ok_or(TokenError::Malformed)?;
        let tag = parts.next().ok_or(TokenError::Malformed)?;

        if version != TOKEN_VERSION || payload.is_empty() || tag.is_empty() {
            return Err(TokenError::Malformed);
        }

        let expected = self.sign(&format!("{TOKEN_VERSION}.{payload}"));
        let matches: bool = expected.as_bytes().ct_eq(tag.as_bytes()).into();
        if !matches {
            return Err(TokenError::BadSignature);
        }

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;

        if claims.expires_at < now {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn encode(&self, claims: &SessionClaims) -> String {
        let json = serde_json::to_vec(claims).expect("claims serialize to JSON");
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signed = format!("{TOKEN_VERSION}.{payload}");
        let tag = self.sign(&signed);
        format!("{signed}.{tag}")
    }

    /// Computes the hex-encoded HMAC-SHA256 tag over `data`.
    fn sign(&self, data: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
