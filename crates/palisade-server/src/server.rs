//! HTTP server.
//!
//! A hyper/tokio HTTP/1.1 server that buffers each request body, tags the
//! request with the peer address, and hands it to [`App::handle`]. One
//! task per connection; graceful shutdown waits for in-flight connections
//! up to a fixed timeout.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Request;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;

use palisade_config::PalisadeConfig;
use palisade_core::{Denial, ErrorCode, ErrorEnvelope, RequestId};
use palisade_middleware::types::{json_response, PeerAddr, Response};

use crate::app::App;

/// How long a request may take end to end, body collection included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// How long shutdown waits for in-flight connections.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Server startup and runtime failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured listen address is invalid or already taken.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address we tried to bind.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The listen address failed to parse.
    #[error("invalid listen address '{0}'")]
    InvalidAddr(String),
}

/// The Palisade HTTP server.
pub struct Server {
    app: App,
    http_addr: String,
    max_body_bytes: usize,
}

impl Server {
    /// Creates a server from validated configuration.
    #[must_use]
    pub fn new(config: &PalisadeConfig) -> Self {
        Self {
            app: App::new(config),
            http_addr: config.http_addr.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// Runs until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServerError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            wait_for_os_signal().await;
            let _ = shutdown_tx.send(true);
        });

        self.run_with_shutdown(shutdown_rx).await
    }

    /// Runs until the shutdown channel flips to `true`.
    pub async fn run_with_shutdown(
        self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ServerError> {
        let addr: SocketAddr = self
            .http_addr
            .parse()
            .map_err(|_| ServerError::InvalidAddr(self.http_addr.clone()))?;

        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: self.http_addr.clone(),
            source,
        })?;

        tracing::info!("listening on {addr}");

        let app = Arc::new(self.app);
        let max_body_bytes = self.max_body_bytes;
        let tracker = drain::ConnectionGauge::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote_addr)) => {
                            let app = Arc::clone(&app);
                            let token = tracker.token();
                            let conn_shutdown = shutdown.clone();

                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(
                                    app,
                                    stream,
                                    remote_addr,
                                    max_body_bytes,
                                    conn_shutdown,
                                )
                                .await
                                {
                                    tracing::debug!("connection from {remote_addr} ended: {e}");
                                }
                                drop(token);
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept failed: {e}");
                        }
                    }
                }

                _ = shutdown.changed() => {
                    tracing::info!("shutdown signal received");
                    break;
                }
            }
        }

        tokio::select! {
            _ = tracker.wait_idle() => {
                tracing::info!("all connections drained");
            }
            _ = tokio::time::sleep(SHUTDOWN_TIMEOUT) => {
                tracing::warn!(
                    "shutdown timeout reached with {} connections active",
                    tracker.active()
                );
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

/// Serves one connection until it closes or shutdown fires.
async fn serve_connection(
    app: Arc<App>,
    stream: tokio::net::TcpStream,
    remote_addr: SocketAddr,
    max_body_bytes: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let app = Arc::clone(&app);
        async move {
            Ok::<_, Infallible>(handle_request(&app, req, remote_addr, max_body_bytes).await)
        }
    });

    let conn = http1::Builder::new().serve_connection(io, service);

    tokio::select! {
        result = conn => result,
        _ = shutdown.changed() => Ok(()),
    }
}

/// Why buffering an incoming body failed.
#[derive(Debug)]
enum BodyError {
    /// More bytes arrived than the edge cap allows.
    TooLarge,
    /// The underlying stream failed.
    Read(Box<dyn std::error::Error + Send + Sync>),
}

/// Buffers a body, refusing to read past `limit` bytes.
///
/// The payload guard checks the same limit again inside the pipeline, but
/// only this cap stops a client from streaming past it in the first place.
async fn collect_limited<B>(body: B, limit: usize) -> Result<Bytes, BodyError>
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(BodyError::TooLarge),
        Err(e) => Err(BodyError::Read(e)),
    }
}

/// Buffers the body, tags the peer address, and runs the app pipeline.
async fn handle_request(
    app: &App,
    request: Request<Incoming>,
    remote_addr: SocketAddr,
    max_body_bytes: usize,
) -> Response {
    let (parts, body) = request.into_parts();
    let collected =
        tokio::time::timeout(REQUEST_TIMEOUT, collect_limited(body, max_body_bytes)).await;

    let bytes = match collected {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(BodyError::TooLarge)) => {
            tracing::warn!("request body exceeded the {max_body_bytes} byte edge cap");
            return edge_error(
                ErrorCode::PayloadTooLarge,
                "Request body exceeds the maximum allowed size",
            );
        }
        Ok(Err(BodyError::Read(e))) => {
            tracing::warn!("failed to read request body: {e}");
            return edge_error(ErrorCode::InternalError, "Failed to read request body");
        }
        Err(_) => {
            tracing::warn!("request body collection timed out");
            return edge_error(ErrorCode::ServiceUnavailable, "Request timed out");
        }
    };

    let mut buffered = Request::from_parts(parts, bytes);
    buffered.extensions_mut().insert(PeerAddr(remote_addr.ip()));

    match tokio::time::timeout(REQUEST_TIMEOUT, app.handle(buffered)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!("request processing timed out");
            edge_error(ErrorCode::ServiceUnavailable, "Request timed out")
        }
    }
}

/// Formats a failure that happened before the pipeline could run.
///
/// These responses still use the standard envelope but carry a fresh
/// request id; correlation never saw the request.
fn edge_error(code: ErrorCode, message: &str) -> Response {
    let denial = Denial::new(code, message);
    let status = denial.status();
    let envelope = ErrorEnvelope::from_denial(&denial, &RequestId::new().to_string(), None);
    let mut response = json_response(status, envelope.to_json());
    response
        .headers_mut()
        .insert("cache-control", "no-store".parse().expect("valid header value"));
    response
}

/// Waits for SIGTERM or SIGINT.
async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("failed to register SIGINT handler: {e}");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = sigint.recv() => tracing::info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to wait for ctrl-c: {e}");
        } else {
            tracing::info!("received ctrl-c");
        }
    }
}

/// Minimal in-flight connection accounting for graceful shutdown.
mod drain {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::sync::Notify;

    /// Counts live tokens and wakes waiters when the count hits zero.
    pub struct ConnectionGauge {
        active: Arc<AtomicUsize>,
        notify: Arc<Notify>,
    }

    impl ConnectionGauge {
        pub fn new() -> Self {
            Self {
                active: Arc::new(AtomicUsize::new(0)),
                notify: Arc::new(Notify::new()),
            }
        }

        pub fn token(&self) -> ConnectionToken {
            self.active.fetch_add(1, Ordering::SeqCst);
            ConnectionToken {
                active: Arc::clone(&self.active),
                notify: Arc::clone(&self.notify),
            }
        }

        pub fn active(&self) -> usize {
            self.active.load(Ordering::SeqCst)
        }

        pub async fn wait_idle(&self) {
            while self.active.load(Ordering::SeqCst) > 0 {
                self.notify.notified().await;
            }
        }
    }

    /// Held for the lifetime of one connection task.
    pub struct ConnectionToken {
        active: Arc<AtomicUsize>,
        notify: Arc<Notify>,
    }

    impl Drop for ConnectionToken {
        fn drop(&mut self) {
            if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
                self.notify.notify_waiters();
            }
        }
    }
}
