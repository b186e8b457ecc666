//! Fixed-order guard pipeline.
//!
//! This module implements the immutable guard pipeline that all requests
//! flow through. The stage order is fixed and cannot be modified by users.
//!
//! ## Pipeline Stages
//!
//! The pipeline consists of 9 mandatory stages in a fixed order:
//!
//! 1. **Correlation** - Generate or propagate request ID (UUID v7) and trace
//! 2. **Envelope** - Render structured error bodies for denials (post-handler)
//! 3. **CORS** - Origin evaluation, preflight, reflection headers
//! 4. **Payload** - Reject oversized request bodies
//! 5. **Negotiation** - Content-Type and Accept enforcement
//! 6. **Rate Limit** - Fixed-window throttling per client
//! 7. **Session** - Signed token verification and rotation
//! 8. **CSRF** - Double-submit token validation on mutations
//! 9. **Identity Propagation** - Identity assertion headers must match the
//!    session
//!
//! Stages 3-9 evaluate before the handler; correlation and envelope wrap
//! the whole chain so every response, including denials, carries IDs and
//! a structured body.

use crate::context::GuardContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use std::sync::Arc;

/// A type-erased stage that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The fixed-order guard pipeline.
///
/// This pipeline cannot be modified after construction. The order of
/// stages is determined at build time by [`crate::stages::standard_pipeline`]
/// and cannot be changed by users.
///
/// # Example
///
/// ```ignore
/// let pipeline = standard_pipeline(settings);
/// let response = pipeline.process(ctx, request, handler).await;
/// ```
pub struct Pipeline {
    /// The ordered guard stages.
    stages: Vec<BoxedMiddleware>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Processes a request through the entire pipeline.
    ///
    /// This is the main entry point for request processing. The request
    /// flows through every stage in order, then to the handler, and each
    /// stage may post-process the response on the way back out.
    pub async fn process<H>(
        &self,
        mut ctx: GuardContext,
        request: Request,
        handler: H,
    ) -> Response
    where
        H: FnOnce(&mut GuardContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        // Build the stage chain from back to front
        let next = self.build_chain(handler);
        next.run(&mut ctx, request).await
    }

    /// Builds the stage chain for a request.
    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut GuardContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        // Start with the handler as the terminal point
        let mut next = Next::handler(handler);

        // Wrap with stages in reverse so the first added runs outermost
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }

        next
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Builder for constructing a [`Pipeline`].
pub struct PipelineBuilder {
    /// Stages in outermost-first order.
    stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty pipeline builder.
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Adds a stage.
    ///
    /// Stages run in the order they are added; the first stage added
    /// wraps everything after it.
    #[must_use]
    pub fn add_stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Builds the pipeline.
    ///
    /// The resulting pipeline has a fixed stage order that cannot be
    /// modified after construction.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Stage marker for the fixed pipeline order.
///
/// This enum represents the canonical order of guard stages and is used
/// to verify pipeline composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 1: Request ID and trace propagation
    Correlation = 1,
    /// Stage 2: Structured denial body rendering
    Envelope = 2,
    /// Stage 3: CORS origin evaluation
    Cors = 3,
    /// Stage 4: Payload size guard
    Payload = 4,
    /// Stage 5: Content negotiation
    Negotiation = 5,
    /// Stage 6: Fixed-window rate limiting
    RateLimit = 6,
    /// Stage 7: Session authentication
    Session = 7,
    /// Stage 8: CSRF validation
    Csrf = 8,
    /// Stage 9: Identity propagation guard
    IdentityPropagation = 9,
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Correlation => "correlation",
            Self::Envelope => "envelope",
            Self::Cors => "cors",
            Self::Payload => "payload",
            Self::Negotiation => "negotiation",
            Self::RateLimit => "rate_limit",
            Self::Session => "session",
            Self::Csrf => "csrf",
            Self::IdentityPropagation => "identity_propagation",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 9] {
        [
            Self::Correlation,
            Self::Envelope,
            Self::Cors,
            Self::Payload,
            Self::Negotiation,
            Self::RateLimit,
            Self::Session,
            Self::Csrf,
            Self::IdentityPropagation,
        ]
    }
}
