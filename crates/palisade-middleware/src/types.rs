//! Common types used throughout the guard pipeline.
//!
//! Requests carry a fully buffered [`Bytes`] body: the payload guard and
//! the JSON handlers need the raw byte length and content without
//! re-reading a stream, so the server collects the body before the
//! pipeline runs.

use bytes::Bytes;
use http_body_util::Full;

/// The HTTP request type used in the guard pipeline.
///
/// A standard `http::Request` with a buffered `Bytes` body.
pub type Request = http::Request<Bytes>;

/// The HTTP response type used in the guard pipeline.
///
/// A standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// The client socket address, inserted into request extensions by the
/// server before the pipeline runs.
///
/// The rate limiter falls back to this when no trusted `X-Forwarded-For`
/// is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub std::net::IpAddr);

/// Builds an empty-bodied response with the given status.
///
/// Stages use this for terminal decisions; the envelope formatter fills
/// in the JSON body from the structured denial recorded in the context.
#[must_use]
pub fn status_response(status: http::StatusCode) -> Response {
    http::Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .expect("status-only response is valid")
}

/// Builds a JSON response with the given status and serialized body.
#[must_use]
pub fn json_response(status: http::StatusCode, body: String) -> Response {
    http::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("json response is valid")
}
