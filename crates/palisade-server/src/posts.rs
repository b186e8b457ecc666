//! In-memory posts repository and CRUD handlers.
//!
//! The repository is deliberately small: a `parking_lot` lock around a
//! vector, enough to exercise the guard pipeline end to end. Ownership is
//! always taken from the verified session claims; an `ownerId` field in a
//! request body is ignored.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, StatusCode};
use http_body_util::Full;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use palisade_core::{Denial, ErrorCode};
use palisade_middleware::context::GuardContext;
use palisade_middleware::types::{json_response, status_response, Response};

/// A stored post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Server-assigned identifier.
    pub id: String,
    /// The user who created the post. Never taken from request bodies.
    pub owner_id: String,
    /// Post title.
    pub title: String,
    /// Post content text.
    pub content: String,
    /// Creation time (epoch seconds).
    pub created_at: i64,
    /// Last modification time (epoch seconds).
    pub updated_at: i64,
}

/// Client-supplied post fields.
///
/// `ownerId` and any other unknown fields are silently dropped during
/// deserialization; the owner comes from the session.
#[derive(Debug, Deserialize)]
struct PostInput {
    title: Option<String>,
    content: Option<String>,
}

/// Thread-safe in-memory post storage.
#[derive(Debug, Default)]
pub struct PostStore {
    posts: RwLock<Vec<Post>>,
}

/// Why a write against a stored post was refused.
#[derive(Debug, PartialEq, Eq)]
enum WriteError {
    NotFound,
    NotOwner,
}

impl PostStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new post owned by `owner_id`.
    fn create(&self, owner_id: &str, title: String, content: String, now: i64) -> Post {
        let post = Post {
            id: Uuid::now_v7().to_string(),
            owner_id: owner_id.to_string(),
            title,
            content,
            created_at: now,
            updated_at: now,
        };
        self.posts.write().push(post.clone());
        post
    }

    /// Returns all posts in insertion order.
    fn list(&self) -> Vec<Post> {
        self.posts.read().clone()
    }

    fn get(&self, id: &str) -> Option<Post> {
        self.posts.read().iter().find(|p| p.id == id).cloned()
    }

    /// Applies field updates to an owned post.
    fn update(
        &self,
        id: &str,
        owner_id: &str,
        title: Option<String>,
        content: Option<String>,
        now: i64,
    ) -> Result<Post, WriteError> {
        let mut posts = self.posts.write();
        let post = posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(WriteError::NotFound)?;

        if post.owner_id != owner_id {
            return Err(WriteError::NotOwner);
        }

        if let Some(title) = title {
            post.title = title;
        }
        if let Some(content) = content {
            post.content = content;
        }
        post.updated_at = now;
        Ok(post.clone())
    }

    /// Removes an owned post.
    fn delete(&self, id: &str, owner_id: &str) -> Result<(), WriteError> {
        let mut posts = self.posts.write();
        let index = posts
            .iter()
            .position(|p| p.id == id)
            .ok_or(WriteError::NotFound)?;

        if posts[index].owner_id != owner_id {
            return Err(WriteError::NotOwner);
        }

        posts.remove(index);
        Ok(())
    }

    /// Number of stored posts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.posts.read().len()
    }

    /// Whether the store holds no posts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.read().is_empty()
    }
}

/// CRUD handler over a shared [`PostStore`].
#[derive(Debug, Clone)]
pub struct PostsHandler {
    store: Arc<PostStore>,
}

impl PostsHandler {
    /// Creates the handler.
    #[must_use]
    pub fn new(store: Arc<PostStore>) -> Self {
        Self { store }
    }

    /// `POST /posts`. Responds 201 with a `Location` header.
    pub fn create(&self, ctx: &mut GuardContext, body: &Bytes, now: i64) -> Response {
        let Some(claims) = ctx.claims().cloned() else {
            return deny(ctx, ErrorCode::Unauthorized, "Authentication required");
        };

        let input = match parse_input(body) {
            Ok(input) => input,
            Err(problems) => return validation_failure(ctx, problems),
        };

        let mut problems = Vec::new();
        let title = match input.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => Some(t.to_string()),
            _ => {
                problems.push(field_problem("title", "must be a non-empty string"));
                None
            }
        };
        let text = match input.content.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => Some(c.to_string()),
            _ => {
                problems.push(field_problem("content", "must be a non-empty string"));
                None
            }
        };

        let (Some(title), Some(text)) = (title, text) else {
            return validation_failure(ctx, problems);
        };

        let post = self.store.create(&claims.user_id, title, text, now);
        let location = format!("/posts/{}", post.id);
        created_response(&post, &location)
    }

    /// `GET /posts`.
    pub fn list(&self, ctx: &mut GuardContext) -> Response {
        let posts = self.store.list();
        match serde_json::to_string(&posts) {
            Ok(json) => json_response(StatusCode::OK, json),
            Err(_) => deny(ctx, ErrorCode::InternalError, "Failed to serialize posts"),
        }
    }

    /// `GET /posts/{id}`.
    pub fn get(&self, ctx: &mut GuardContext, params: &HashMap<String, String>) -> Response {
        let Some(post) = params.get("id").and_then(|id| self.store.get(id)) else {
            return deny(ctx, ErrorCode::NotFound, "Post not found");
        };

        match serde_json::to_string(&post) {
            Ok(json) => json_response(StatusCode::OK, json),
            Err(_) => deny(ctx, ErrorCode::InternalError, "Failed to serialize post"),
        }
    }

    /// `PUT /posts/{id}`. Only the owner recorded at creation may update.
    pub fn update(
        &self,
        ctx: &mut GuardContext,
        params: &HashMap<String, String>,
        body: &Bytes,
        now: i64,
    ) -> Response {
        let Some(claims) = ctx.claims().cloned() else {
            return deny(ctx, ErrorCode::Unauthorized, "Authentication required");
        };
        let Some(id) = params.get("id").cloned() else {
            return deny(ctx, ErrorCode::NotFound, "Post not found");
        };

        let input = match parse_input(body) {
            Ok(input) => input,
            Err(problems) => return validation_failure(ctx, problems),
        };

        let title = non_empty(input.title);
        let text = non_empty(input.content);
        if title.is_none() && text.is_none() {
            return validation_failure(
                ctx,
                vec![field_problem(
                    "title",
                    "at least one of title or content must be a non-empty string",
                )],
            );
        }

        match self.store.update(&id, &claims.user_id, title, text, now) {
            Ok(post) => match serde_json::to_string(&post) {
                Ok(json) => json_response(StatusCode::OK, json),
                Err(_) => deny(ctx, ErrorCode::InternalError, "Failed to serialize post"),
            },
            Err(e) => write_error(ctx, e),
        }
    }

    /// `DELETE /posts/{id}`. Responds 204 on success.
    pub fn delete(
        &self,
        ctx: &mut GuardContext,
        params: &HashMap<String, String>,
    ) -> Response {
        let Some(claims) = ctx.claims().cloned() else {
            return deny(ctx, ErrorCode::Unauthorized, "Authentication required");
        };
        let Some(id) = params.get("id") else {
            return deny(ctx, ErrorCode::NotFound, "Post not found");
        };

        match self.store.delete(id, &claims.user_id) {
            Ok(()) => status_response(StatusCode::NO_CONTENT),
            Err(e) => write_error(ctx, e),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn parse_input(body: &Bytes) -> Result<PostInput, Vec<serde_json::Value>> {
    if body.is_empty() {
        return Err(vec![field_problem("body", "request body is required")]);
    }
    serde_json::from_slice(body)
        .map_err(|e| vec![json!({ "field": "$", "message": format!("invalid JSON: {e}") })])
}

fn field_problem(field: &str, message: &str) -> serde_json::Value {
    json!({ "field": field, "message": message })
}

fn deny(ctx: &mut GuardContext, code: ErrorCode, message: &str) -> Response {
    let denial = Denial::new(code, message);
    let status = denial.status();
    ctx.set_denial(denial);
    status_response(status)
}

fn validation_failure(ctx: &mut GuardContext, problems: Vec<serde_json::Value>) -> Response {
    ctx.set_denial(
        Denial::new(ErrorCode::ValidationError, "Request body failed validation")
            .with_details(problems),
    );
    status_response(StatusCode::UNPROCESSABLE_ENTITY)
}

fn write_error(ctx: &mut GuardContext, error: WriteError) -> Response {
    match error {
        WriteError::NotFound => deny(ctx, ErrorCode::NotFound, "Post not found"),
        WriteError::NotOwner => deny(
            ctx,
            ErrorCode::Forbidden,
            "Only the owner may modify this post",
        ),
    }
}

fn created_response(post: &Post, location: &str) -> Response {
    let body = serde_json::to_string(post).unwrap_or_else(|_| "{}".to_string());
    http::Response::builder()
        .status(StatusCode::CREATED)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::LOCATION, location)
        .body(Full::new(Bytes::from(body)))
        .expect("created response is valid")
}
