//! CSRF token generation and validation.
//!
//! Two token shapes coexist permanently:
//!
//! - **Bound**: `"<unixSeconds>-<suffix>"` with an alphanumeric suffix,
//!   valid only inside a freshness window of two hours back and five
//!   minutes of forward clock skew. A 32-lowercase-hex suffix is treated
//!   as *session-bound*: it must recompute as the truncated
//!   `HMAC-SHA256(secret, user_id + "." + unixSeconds)` for the current
//!   session, and a recompute mismatch is reported distinctly from an
//!   invalid or expired token.
//! - **Legacy/opaque**: any non-empty value with no timestamp structure,
//!   accepted only on strict byte equality between cookie and header
//!   (double-submit), with no TTL.
//!
//! A value that *looks* timestamped but is broken (empty suffix, a second
//! dash, non-alphanumeric characters) is invalid, never legacy.
//!
//! All comparisons of attacker-supplied values are constant-time.

use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted token age in seconds (2 hours).
pub const CSRF_MAX_AGE_SECS: i64 = 7_200;

/// Forward clock-skew tolerance in seconds (5 minutes).
pub const CSRF_SKEW_SECS: i64 = 300;

/// Width of a session-bound suffix: truncated HMAC, hex-encoded.
const BOUND_SUFFIX_HEX_LEN: usize = 32;

/// Structural classification of a single CSRF token value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrfShape<'a> {
    /// No timestamp structure; candidate for legacy double-submit.
    Opaque,
    /// `<unixSeconds>-<alphanumeric suffix>`.
    Bound {
        /// The embedded issue time, epoch seconds.
        timestamp: i64,
        /// The opaque or session-bound suffix.
        suffix: &'a str,
    },
    /// Timestamp intent but broken structure; always invalid.
    Malformed,
}

/// Outcome of validating the cookie/header pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrfVerdict {
    /// Accepted via the legacy double-submit path (no TTL).
    AcceptedLegacy,
    /// Accepted as a fresh bound token.
    AcceptedBound,
    /// Structurally invalid, outside the freshness window, or the pair
    /// does not double-submit.
    InvalidOrExpired,
    /// Well-formed session-bound token minted for a different user.
    SessionMismatch,
}

/// Classifies a raw token value.
///
/// The prefix before the first dash decides intent: all digits means the
/// value claims to be timestamped and must then satisfy the full bound
/// grammar; anything else has no timestamp structure and is opaque.
#[must_use]
pub fn classify(token: &str) -> CsrfShape<'_> {
    let Some((prefix, suffix)) = token.split_once('-') else {
        return CsrfShape::Opaque;
    };

    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return CsrfShape::Opaque;
    }

    // Timestamp intent from here on: failures are invalid, not legacy.
    let Ok(timestamp) = prefix.parse::<i64>() else {
        return CsrfShape::Malformed;
    };
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_alphanumeric()) {
        // Covers a second dash ("too many dashes") in the suffix.
        return CsrfShape::Malformed;
    }

    CsrfShape::Bound { timestamp, suffix }
}

/// Validates the double-submitted cookie/header pair.
///
/// `session_user` is the verified session's user ID; it is used only to
/// recompute session-bound suffixes.
#[must_use]
pub fn validate_pair(
    cookie: &str,
    header: &str,
    now: i64,
    session_user: &str,
    secret: &[u8],
) -> CsrfVerdict {
    if cookie.is_empty() || header.is_empty() {
        return CsrfVerdict::InvalidOrExpired;
    }

    let byte_equal: bool = cookie.as_bytes().ct_eq(header.as_bytes()).into();
    if !byte_equal {
        return CsrfVerdict::InvalidOrExpired;
    }

    // cookie == header from here on; classify once.
    match classify(cookie) {
        CsrfShape::Opaque => CsrfVerdict::AcceptedLegacy,
        CsrfShape::Malformed => CsrfVerdict::InvalidOrExpired,
        CsrfShape::Bound { timestamp, suffix } => {
            if timestamp < now - CSRF_MAX_AGE_SECS || timestamp > now + CSRF_SKEW_SECS {
                return CsrfVerdict::InvalidOrExpired;
            }

            if looks_session_bound(suffix) {
                let expected = bound_suffix(secret, session_user, timestamp);
                let matches: bool = expected.as_bytes().ct_eq(suffix.as_bytes()).into();
                if !matches {
                    return CsrfVerdict::SessionMismatch;
                }
            }

            CsrfVerdict::AcceptedBound
        }
    }
}

/// Generates a session-bound token for `user_id` issued at `now`.
#[must_use]
pub fn generate_bound(secret: &[u8], user_id: &str, now: i64) -> String {
    format!("{now}-{}", bound_suffix(secret, user_id, now))
}

/// Generates a bound token with a random (non-session-bound) suffix.
///
/// Uses the operating system CSPRNG directly for the random component.
#[must_use]
pub fn generate_random(now: i64) -> String {
    let mut bytes = [0u8; 20];
    OsRng.fill_bytes(&mut bytes);
    // Map into the alphanumeric class; hex would collide with the
    // session-bound width at 32 chars, so emit 40 chars.
    format!("{now}-{}", hex::encode(bytes))
}

/// True when a suffix has the exact shape of a truncated-HMAC suffix.
fn looks_session_bound(suffix: &str) -> bool {
    suffix.len() == BOUND_SUFFIX_HEX_LEN
        && suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Truncated hex HMAC-SHA256 over `user_id + "." + timestamp`.
fn bound_suffix(secret: &[u8], user_id: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(user_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.to_string().as_bytes());
    let tag = hex::encode(mac.finalize().into_bytes());
    tag[..BOUND_SUFFIX_HEX_LEN].to_string()
}
