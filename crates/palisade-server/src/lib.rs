//! Palisade HTTP server.
//!
//! Wires the guard pipeline from `palisade-middleware` in front of a small
//! reference API: an in-memory posts CRUD surface, a development-only
//! login route, and a health probe.
//!
//! | Route | Operation |
//! |-------|-----------|
//! | `POST /auth/login` | mint dev session + CSRF cookies |
//! | `GET /health` | liveness probe, rate-limit exempt |
//! | `POST /posts` | create a post owned by the session user |
//! | `GET /posts` | list posts |
//! | `GET /posts/{id}` | fetch one post |
//! | `PUT /posts/{id}` | update an owned post |
//! | `DELETE /posts/{id}` | delete an owned post |
//!
//! [`App`] is the transport-free core: one `async fn handle` over buffered
//! requests. [`Server`] is the hyper front end that feeds it.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod auth;
pub mod health;
pub mod posts;
pub mod router;
pub mod server;

pub use app::App;
pub use auth::AuthHandler;
pub use posts::{Post, PostStore, PostsHandler};
pub use router::{Operation, RouteMatch, Router, RouterOutcome};
pub use server::{Server, ServerError};
