//! Core guard stage trait and chaining types.
//!
//! This module defines the [`Middleware`] trait that all guard stages
//! implement. Stages inspect requests before the handler runs and may
//! short-circuit with a denial, or post-process the handler's response.
//!
//! # Design Philosophy
//!
//! Palisade uses a fixed-order guard pipeline. Stages cannot be reordered,
//! disabled, or inserted between core gates. Every deployment evaluates the
//! same checks in the same sequence.

use crate::context::GuardContext;
use crate::types::{Request, Response};
use std::future::Future;
use std::pin::Pin;

/// A boxed future that returns a response.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core guard stage trait.
///
/// All stages implement this trait. A stage receives a mutable context,
/// the buffered request, and a [`Next`] callback to invoke the rest of
/// the chain.
///
/// # Invariants
///
/// - A stage MUST call `next.run()` exactly once unless short-circuiting
/// - A short-circuiting stage MUST record a [`palisade_core::Denial`] in
///   the context so the envelope formatter can render a structured body
/// - A stage MUST NOT suppress denials recorded downstream
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this stage.
    ///
    /// This name is used for logging and debugging.
    fn name(&self) -> &'static str;

    /// Process the request through this stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The mutable guard context
    /// * `request` - The buffered HTTP request
    /// * `next` - Callback to invoke the rest of the chain
    ///
    /// # Returns
    ///
    /// The HTTP response (either from downstream or generated here)
    fn process<'a>(
        &'a self,
        ctx: &'a mut GuardContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// Callback to invoke the next stage in the chain.
///
/// This type is passed to stages and must be called (exactly once)
/// to continue processing. If not called, the stage short-circuits
/// the pipeline and returns its own response.
pub struct Next<'a> {
    /// The remaining stage chain
    inner: NextInner<'a>,
}

/// Internal representation of the remaining chain.
enum NextInner<'a> {
    /// More stages to process
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    /// End of chain, invoke the handler
    Handler(Box<dyn FnOnce(&mut GuardContext, Request) -> BoxFuture<'static, Response> + Send + 'a>),
}

impl<'a> Next<'a> {
    /// Creates a new `Next` that will invoke the given stage.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub(crate) fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut GuardContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next stage or handler in the chain.
    ///
    /// This consumes `self` to ensure it can only be called once.
    pub async fn run(self, ctx: &mut GuardContext, request: Request) -> Response {
        match self.inner {
            NextInner::Chain { middleware, next } => {
                middleware.process(ctx, request, *next).await
            }
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}
