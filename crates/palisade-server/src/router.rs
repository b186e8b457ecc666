//! Path-template routing.
//!
//! Routes map an HTTP method plus a path template to an [`Operation`].
//! Templates are a sequence of literal segments and `{param}` captures:
//!
//! ```text
//! /posts            -> [Literal("posts")]
//! /posts/{id}       -> [Literal("posts"), Param("id")]
//! ```
//!
//! Matching is first-registered-wins. A path that matches a template under
//! a different method yields [`RouterOutcome::MethodMismatch`] so the
//! caller can answer 405 instead of 404.

use std::collections::HashMap;

use http::Method;

/// The operations the server exposes.
///
/// Handlers are dispatched on this enum rather than on freeform operation
/// strings; an unmatched route is a routing outcome, not a missing handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `POST /auth/login` (development mode only).
    Login,
    /// `GET /health`.
    Health,
    /// `POST /posts`.
    CreatePost,
    /// `GET /posts`.
    ListPosts,
    /// `GET /posts/{id}`.
    GetPost,
    /// `PUT /posts/{id}`.
    UpdatePost,
    /// `DELETE /posts/{id}`.
    DeletePost,
}

impl Operation {
    /// Returns a stable name for logging.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Health => "health",
            Self::CreatePost => "create_post",
            Self::ListPosts => "list_posts",
            Self::GetPost => "get_post",
            Self::UpdatePost => "update_post",
            Self::DeletePost => "delete_post",
        }
    }
}

/// One segment of a parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Exact-match literal.
    Literal(String),
    /// Named capture, written `{name}` in the template.
    Param(String),
}

/// A registered route.
#[derive(Debug, Clone)]
struct Route {
    method: Method,
    segments: Vec<Segment>,
    operation: Operation,
}

impl Route {
    fn parse(method: Method, template: &str, operation: Operation) -> Self {
        let segments = template
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if let Some(name) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Segment::Param(name.to_string())
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();

        Self {
            method,
            segments,
            operation,
        }
    }

    /// Matches path segments against this template, collecting captures.
    fn match_path(&self, parts: &[&str]) -> Option<HashMap<String, String>> {
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }

        Some(params)
    }
}

/// A successful route match.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The matched operation.
    pub operation: Operation,
    /// Captured `{param}` values.
    pub params: HashMap<String, String>,
}

impl RouteMatch {
    /// Returns a captured parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// The result of routing a request.
#[derive(Debug, Clone)]
pub enum RouterOutcome {
    /// A route matched.
    Matched(RouteMatch),
    /// The path matched a template but not under this method.
    MethodMismatch,
    /// No template matched the path.
    NotFound,
}

/// Method-aware path router.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers a route. First registration wins on overlap.
    pub fn add_route(&mut self, method: Method, template: &str, operation: Operation) {
        self.routes.push(Route::parse(method, template, operation));
    }

    /// Routes a request.
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> RouterOutcome {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut path_matched = false;

        for route in &self.routes {
            if let Some(params) = route.match_path(&parts) {
                if route.method == *method {
                    return RouterOutcome::Matched(RouteMatch {
                        operation: route.operation,
                        params,
                    });
                }
                path_matched = true;
            }
        }

        if path_matched {
            RouterOutcome::MethodMismatch
        } else {
            RouterOutcome::NotFound
        }
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

/// Builds the router for the full API surface.
#[must_use]
pub fn standard_router() -> Router {
    let mut router = Router::new();
    router.add_route(Method::POST, "/auth/login", Operation::Login);
    router.add_route(Method::GET, "/health", Operation::Health);
    router.add_route(Method::POST, "/posts", Operation::CreatePost);
    router.add_route(Method::GET, "/posts", Operation::ListPosts);
    router.add_route(Method::GET, "/posts/{id}", Operation::GetPost);
    router.add_route(Method::PUT, "/posts/{id}", Operation::UpdatePost);
    router.add_route(Method::DELETE, "/posts/{id}", Operation::DeletePost);
    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_route_matches() {
        let router = standard_router();
        match router.route(&Method::GET, "/health") {
            RouterOutcome::Matched(m) => assert_eq!(m.operation, Operation::Health),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn param_route_captures_value() {
        let router = standard_router();
        match router.route(&Method::GET, "/posts/abc-123") {
            RouterOutcome::Matched(m) => {
                assert_eq!(m.operation, Operation::GetPost);
                assert_eq!(m.param("id"), Some("abc-123"));
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn trailing_slash_is_equivalent() {
        let router = standard_router();
        assert!(matches!(
            router.route(&Method::GET, "/posts/"),
            RouterOutcome::Matched(_)
        ));
    }

    #[test]
    fn wrong_method_is_a_method_mismatch() {
        let router = standard_router();
        assert!(matches!(
            router.route(&Method::PATCH, "/posts/abc"),
            RouterOutcome::MethodMismatch
        ));
    }

    #[test]
    fn unknown_path_is_not_found() {
        let router = standard_router();
        assert!(matches!(
            router.route(&Method::GET, "/unknown"),
            RouterOutcome::NotFound
        ));
    }

    #[test]
    fn deeper_path_does_not_match_shorter_template() {
        let router = standard_router();
        assert!(matches!(
            router.route(&Method::GET, "/posts/a/b"),
            RouterOutcome::NotFound
        ));
    }
}
