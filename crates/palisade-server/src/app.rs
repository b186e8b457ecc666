//! Application wiring.
//!
//! [`App`] owns the guard pipeline, the router, and the handlers, and
//! exposes a single [`App::handle`] entry point over buffered requests.
//! The server feeds it from sockets; tests feed it directly.

use std::sync::Arc;

use http::StatusCode;

use palisade_config::{CorsOrigins, PalisadeConfig};
use palisade_core::{Denial, ErrorCode, SessionTokenCodec};
use palisade_middleware::context::GuardContext;
use palisade_middleware::pipeline::Pipeline;
use palisade_middleware::stages::{
    standard_pipeline, AllowedOrigins, CorsStage, CsrfStage, IdentityPropagationStage,
    InMemoryRateLimitStore, NegotiationStage, PayloadStage, RateLimitStage, SessionStage,
};
use palisade_middleware::types::{status_response, Request, Response};

use crate::auth::AuthHandler;
use crate::health::health_response;
use crate::posts::{PostStore, PostsHandler};
use crate::router::{standard_router, Operation, Router, RouterOutcome};

/// Paths the authentication guards skip: login has no session yet.
const AUTH_SKIP_PATHS: &[&str] = &["/auth/login"];
/// Paths the rate limiter skips: probes never burn user quota.
const RATE_LIMIT_SKIP_PATHS: &[&str] = &["/health"];

fn skip_paths(paths: &[&str]) -> Vec<String> {
    paths.iter().map(ToString::to_string).collect()
}

/// The assembled application: pipeline in front, handlers behind.
#[derive(Clone)]
pub struct App {
    pipeline: Arc<Pipeline>,
    router: Arc<Router>,
    posts: PostsHandler,
    auth: AuthHandler,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("stages", &self.pipeline.stage_count())
            .field("routes", &self.router.route_count())
            .finish_non_exhaustive()
    }
}

impl App {
    /// Assembles the pipeline and handlers from validated configuration.
    #[must_use]
    pub fn new(config: &PalisadeConfig) -> Self {
        let production = config.mode.is_production();
        let codec = Arc::new(SessionTokenCodec::new(config.session_secret.clone()));

        let origins = match &config.cors_origins {
            CorsOrigins::Any => AllowedOrigins::Any,
            CorsOrigins::List(list) => AllowedOrigins::List(list.clone()),
        };

        let pipeline = standard_pipeline(
            CorsStage::new(
                origins,
                config.allow_credentials,
                config.allow_null_origin,
                production,
            ),
            PayloadStage::new(config.max_body_bytes),
            NegotiationStage::new(),
            RateLimitStage::new(
                Arc::new(InMemoryRateLimitStore::new()),
                config.rate_limit_max,
                config.rate_limit_window_ms,
                config.trust_proxy,
                Arc::clone(&codec),
                skip_paths(RATE_LIMIT_SKIP_PATHS),
            ),
            SessionStage::new(Arc::clone(&codec), production, skip_paths(AUTH_SKIP_PATHS)),
            CsrfStage::new(config.session_secret.clone(), skip_paths(AUTH_SKIP_PATHS)),
            IdentityPropagationStage::new(skip_paths(AUTH_SKIP_PATHS)),
        );

        Self {
            pipeline: Arc::new(pipeline),
            router: Arc::new(standard_router()),
            posts: PostsHandler::new(Arc::new(PostStore::new())),
            auth: AuthHandler::new(codec, config.session_secret.clone(), production),
        }
    }

    /// Runs one buffered request through the pipeline and handlers.
    pub async fn handle(&self, request: Request) -> Response {
        let ctx = GuardContext::for_request(&request);
        let router = Arc::clone(&self.router);
        let posts = self.posts.clone();
        let auth = self.auth.clone();

        self.pipeline
            .process(ctx, request, move |ctx, request| {
                let response = dispatch(&router, &posts, &auth, ctx, &request);
                Box::pin(async move { response })
            })
            .await
    }
}

/// Routes a request that cleared every guard and invokes its handler.
fn dispatch(
    router: &Router,
    posts: &PostsHandler,
    auth: &AuthHandler,
    ctx: &mut GuardContext,
    request: &Request,
) -> Response {
    let now = chrono::Utc::now().timestamp();
    let method = request.method();
    let path = request.uri().path();

    match router.route(method, path) {
        RouterOutcome::NotFound => {
            ctx.set_denial(Denial::new(ErrorCode::NotFound, "Route not found"));
            status_response(StatusCode::NOT_FOUND)
        }
        RouterOutcome::MethodMismatch => {
            ctx.set_denial(Denial::new(
                ErrorCode::NotFound,
                "No route matches the request method",
            ));
            status_response(StatusCode::NOT_FOUND)
        }
        RouterOutcome::Matched(matched) => match matched.operation {
            Operation::Health => health_response(),
            Operation::Login => auth.login(ctx, request.body(), now),
            Operation::CreatePost => posts.create(ctx, request.body(), now),
            Operation::ListPosts => posts.list(ctx),
            Operation::GetPost => posts.get(ctx, &matched.params),
            Operation::UpdatePost => posts.update(ctx, &matched.params, request.body(), now),
            Operation::DeletePost => posts.delete(ctx, &matched.params),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Method;

    fn app() -> App {
        App::new(&PalisadeConfig::default())
    }

    fn request(method: Method, path: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .expect("request builds")
    }

    #[tokio::test]
    async fn health_bypasses_authentication() {
        let app = app();
        let response = app.handle(request(Method::GET, "/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_enveloped_not_found() {
        let app = app();
        let response = app.handle(request(Method::GET, "/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn every_response_carries_a_request_id() {
        let app = app();
        let response = app.handle(request(Method::GET, "/health")).await;
        assert!(response.headers().get("x-request-id").is_some());
    }
}
