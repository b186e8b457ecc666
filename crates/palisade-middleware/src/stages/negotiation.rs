//! Content negotiation guard.
//!
//! Two independent checks:
//!
//! - **Content-Type**: mutating requests with a non-empty body must declare
//!   `application/json` (media-type parameters allowed). Anything else,
//!   `application/jsonp` included, is 415.
//! - **Accept**: every method except `OPTIONS` and `HEAD` must be able to
//!   receive `application/json`: an absent header, `*/*`, `application/*`,
//!   or an explicit `application/json` entry passes; anything else is 406
//!   with a hint naming the required media type.

use crate::context::{GuardContext, is_mutating};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, status_response};
use http::{Method, StatusCode};
use palisade_core::{Denial, ErrorCode};

/// The only media type this API speaks.
const JSON_MEDIA_TYPE: &str = "application/json";

/// Stage that enforces JSON in and JSON out.
#[derive(Debug, Clone, Default)]
pub struct NegotiationStage;

impl NegotiationStage {
    /// Creates the negotiation guard.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Prefix media-type match: `application/json` with optional parameters.
    fn is_json_content_type(value: &str) -> bool {
        let media_type = value.split(';').next().unwrap_or("").trim();
        media_type.eq_ignore_ascii_case(JSON_MEDIA_TYPE)
    }

    /// Whether the `Accept` value can receive JSON.
    fn accepts_json(value: &str) -> bool {
        value.split(',').any(|entry| {
            let media_type = entry.split(';').next().unwrap_or("").trim();
            media_type == "*/*"
                || media_type.eq_ignore_ascii_case("application/*")
                || media_type.eq_ignore_ascii_case(JSON_MEDIA_TYPE)
        })
    }
}

impl Middleware for NegotiationStage {
    fn name(&self) -> &'static str {
        "negotiation"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut GuardContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method().clone();
            let profile = ctx.profile();

            if is_mutating(&method) && profile.content_length > 0 {
                let json = profile
                    .content_type
                    .as_deref()
                    .is_some_and(Self::is_json_content_type);
                if !json {
                    ctx.set_denial(Denial::new(
                        ErrorCode::UnsupportedMediaType,
                        "Request body must be application/json",
                    ));
                    return status_response(StatusCode::UNSUPPORTED_MEDIA_TYPE);
                }
            }

            if method != Method::OPTIONS && method != Method::HEAD {
                let acceptable = match ctx.profile().accept.as_deref() {
                    None => true,
                    Some(accept) => Self::accepts_json(accept),
                };
                if !acceptable {
                    ctx.set_denial(
                        Denial::new(
                            ErrorCode::NotAcceptable,
                            "Requested representation is not available",
                        )
                        .with_hint(JSON_MEDIA_TYPE),
                    );
                    return status_response(StatusCode::NOT_ACCEPTABLE);
                }
            }

            next.run(ctx, request).await
        })
    }
}
