//! Guard pipeline stages.
//!
//! This module contains the implementations of the 9 mandatory guard
//! stages. They execute in a fixed order and cannot be disabled or
//! reordered; [`standard_pipeline`] is the only composition.
//!
//! 1. [`correlation`] - Request ID and trace propagation
//! 2. [`envelope`] - Structured denial bodies
//! 3. [`cors`] - Origin policy and preflight
//! 4. [`payload`] - Body size guard
//! 5. [`negotiation`] - Content-Type / Accept enforcement
//! 6. [`rate_limit`] - Fixed-window throttling
//! 7. [`session`] - Signed token verification and rotation
//! 8. [`csrf`] - Double-submit token validation
//! 9. [`identity_propagation`] - Asserted identity cross-check

pub mod cors;
pub mod correlation;
pub mod csrf;
pub mod envelope;
pub mod identity_propagation;
pub mod negotiation;
pub mod payload;
pub mod rate_limit;
pub mod session;

// Re-export main types
pub use cors::{AllowedOrigins, CorsDecision, CorsStage};
pub use correlation::CorrelationStage;
pub use csrf::CsrfStage;
pub use envelope::EnvelopeStage;
pub use identity_propagation::IdentityPropagationStage;
pub use negotiation::NegotiationStage;
pub use payload::PayloadStage;
pub use rate_limit::{InMemoryRateLimitStore, RateLimitStage, RateLimitStore};
pub use session::SessionStage;

use crate::pipeline::Pipeline;

/// Composes the fixed-order pipeline from configured gate stages.
///
/// Correlation and the envelope formatter always wrap the gates so every
/// response, denials included, carries correlation IDs and a structured
/// body.
#[must_use]
pub fn standard_pipeline(
    cors: CorsStage,
    payload: PayloadStage,
    negotiation: NegotiationStage,
    rate_limit: RateLimitStage,
    session: SessionStage,
    csrf: CsrfStage,
    identity_propagation: IdentityPropagationStage,
) -> Pipeline {
    Pipeline::builder()
        .add_stage(CorrelationStage::new())
        .add_stage(EnvelopeStage::new())
        .add_stage(cors)
        .add_stage(payload)
        .add_stage(negotiation)
        .add_stage(rate_limit)
        .add_stage(session)
        .add_stage(csrf)
        .add_stage(identity_propagation)
        .build()
}
