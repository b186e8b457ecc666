//! # Palisade Core
//!
//! Shared types for the Palisade BFF request-guard pipeline:
//!
//! - [`RequestId`] / [`TraceContext`] — correlation attached to every
//!   response, including terminal denials.
//! - [`SessionClaims`] / [`IdentityAssertion`] — verified session identity
//!   and the caller-asserted propagation headers it is checked against.
//! - [`SessionTokenCodec`] — HMAC-signed session tokens with time-boxed
//!   rotation.
//! - [`csrf`] — dual-mode CSRF tokens (legacy double-submit plus
//!   timestamp-bound and session-bound variants).
//! - [`ErrorCode`] / [`Denial`] / [`ErrorEnvelope`] — the error taxonomy
//!   and uniform JSON envelope for every non-2xx outcome.
//!
//! This crate holds no I/O; everything here is pure data and synchronous
//! CPU-bound crypto.

#![doc(html_root_url = "https://docs.rs/palisade-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod csrf;
pub mod error;
pub mod identity;
pub mod token;

// Re-export main types at crate root
pub use context::{RequestId, TraceContext};
pub use error::{Denial, ErrorCode, ErrorEnvelope};
pub use identity::{IdentityAssertion, SessionClaims};
pub use token::{ROTATION_THRESHOLD_SECS, SESSION_TTL_SECS, SessionTokenCodec, TokenError};
