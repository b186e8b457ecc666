//! # Palisade Middleware
//!
//! The guard pipeline for Palisade's BFF API.
//!
//! This crate provides the fixed-order pipeline that every inbound request
//! flows through before any business logic runs. The stage order is
//! immutable: every deployment evaluates the same gates in the same
//! sequence, and each gate fails closed.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Request → Correlation → Envelope → CORS → Payload → Negotiation
//!            → RateLimit → Session → CSRF → IdentityPropagation → Handler
//! ```
//!
//! | Stage | Purpose                                               |
//! |-------|-------------------------------------------------------|
//! | 1     | Resolve request ID (UUID v7) and trace correlation    |
//! | 2     | Render structured JSON bodies for denials             |
//! | 3     | Origin policy; terminal 204 for all `OPTIONS`         |
//! | 4     | Reject oversized bodies before authentication         |
//! | 5     | Enforce `application/json` in and out                 |
//! | 6     | Fixed-window rate limiting per user or IP             |
//! | 7     | Verify the signed session cookie, decide rotation     |
//! | 8     | Dual-mode double-submit CSRF validation (mutations)   |
//! | 9     | Cross-check asserted identity headers (mutations)     |
//!
//! ## Example
//!
//! ```
//! use palisade_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 9);
//! assert_eq!(stages[0].name(), "correlation");
//! assert_eq!(stages[8].name(), "identity_propagation");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod types;

// Re-export main types at crate root
pub use context::{GuardContext, RequestProfile};
pub use middleware::{BoxFuture, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use types::{PeerAddr, Request, Response};
