//! Development-mode login.
//!
//! `POST /auth/login` mints a signed session cookie plus a session-bound
//! CSRF cookie so a frontend (or a test) can exercise the guarded routes
//! without a real identity provider. The route only exists in development
//! mode; in production the handler answers as if the route were absent.

use std::sync::Arc;

use bytes::Bytes;
use http::{header, StatusCode};
use http_body_util::Full;
use serde::Deserialize;
use serde_json::json;

use palisade_core::{csrf, Denial, ErrorCode, SessionTokenCodec};
use palisade_middleware::context::GuardContext;
use palisade_middleware::stages::session::session_cookie_value;
use palisade_middleware::types::{status_response, Response};

/// Default identity when the login body omits fields.
const DEFAULT_USER_ID: &str = "dev-user";
/// Default role when the login body omits fields.
const DEFAULT_ROLE: &str = "member";

/// Optional identity overrides in the login body.
#[derive(Debug, Default, Deserialize)]
struct LoginInput {
    #[serde(rename = "userId")]
    user_id: Option<String>,
    role: Option<String>,
}

/// Handler for the dev login route.
#[derive(Clone)]
pub struct AuthHandler {
    codec: Arc<SessionTokenCodec>,
    secret: Vec<u8>,
    production: bool,
}

impl std::fmt::Debug for AuthHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthHandler")
            .field("production", &self.production)
            .finish_non_exhaustive()
    }
}

impl AuthHandler {
    /// Creates the handler.
    #[must_use]
    pub fn new(codec: Arc<SessionTokenCodec>, secret: impl Into<Vec<u8>>, production: bool) -> Self {
        Self {
            codec,
            secret: secret.into(),
            production,
        }
    }

    /// `POST /auth/login`.
    ///
    /// An empty or partial body falls back to a default dev identity.
    pub fn login(&self, ctx: &mut GuardContext, body: &Bytes, now: i64) -> Response {
        if self.production {
            // The route does not exist outside development.
            ctx.set_denial(Denial::new(ErrorCode::NotFound, "Route not found"));
            return status_response(StatusCode::NOT_FOUND);
        }

        let input: LoginInput = if body.is_empty() {
            LoginInput::default()
        } else {
            match serde_json::from_slice(body) {
                Ok(input) => input,
                Err(e) => {
                    ctx.set_denial(
                        Denial::new(ErrorCode::ValidationError, "Request body failed validation")
                            .with_details(vec![
                                json!({ "field": "$", "message": format!("invalid JSON: {e}") }),
                            ]),
                    );
                    return status_response(StatusCode::UNPROCESSABLE_ENTITY);
                }
            }
        };

        let user_id = input.user_id.unwrap_or_else(|| DEFAULT_USER_ID.to_string());
        let role = input.role.unwrap_or_else(|| DEFAULT_ROLE.to_string());

        let (token, claims) = self.codec.mint(&user_id, &role, now);
        let csrf_token = csrf::generate_bound(&self.secret, &claims.user_id, now);

        tracing::info!(user = %claims.log_id(), role = %claims.role, "dev login");

        let response_body = json!({
            "userId": claims.user_id,
            "role": claims.role,
            "csrfToken": csrf_token,
        });

        http::Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::SET_COOKIE,
                session_cookie_value(&token, self.production),
            )
            .header(header::SET_COOKIE, csrf_cookie_value(&csrf_token))
            .body(Full::new(Bytes::from(response_body.to_string())))
            .expect("login response is valid")
    }
}

/// The CSRF cookie is readable by frontend script on purpose: the
/// double-submit pattern requires the client to echo it in a header.
fn csrf_cookie_value(token: &str) -> String {
    format!("csrf={token}; SameSite=Strict; Path=/")
}
