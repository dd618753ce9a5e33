//! Async TCP server using Tokio.
//!
//! Accepts TCP (or TLS) connections and dispatches HTTP/1.1 requests through
//! a [`Router`]. Supports persistent connections, per-connection read/write/
//! idle deadlines, and graceful shutdown: SIGINT/SIGTERM stops the accept
//! loop, signals open connections, and drains in-flight requests before
//! [`Server::run`] returns.
//!
//! The router performs no blocking waits of its own; deadlines and
//! cancellation live entirely at this transport layer.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::router::Router;

/// Errors produced by the server.
///
/// Configuration and TLS-material errors surface before the server starts
/// accepting traffic and are fatal; everything after startup is reported
/// per-connection and never aborts the process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read TLS material from {path}: {source}")]
    TlsMaterial {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no private key found in {path}")]
    MissingPrivateKey { path: String },

    #[error("invalid TLS certificate or key: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// TLS certificate and private key paths, PEM-encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Server configuration: bind address, connection deadlines, optional TLS.
///
/// Deserializable from JSON (timeouts in whole seconds) via
/// [`ServerConfig::from_file`]:
///
/// ```json
/// {
///     "addr": "0.0.0.0:8443",
///     "read_timeout": 10,
///     "write_timeout": 10,
///     "idle_timeout": 60,
///     "tls": { "cert_file": "cert.pem", "key_file": "key.pem" }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address, e.g. `"127.0.0.1:8080"`.
    pub addr: String,
    /// Deadline for reading a single request.
    #[serde(with = "duration_secs")]
    pub read_timeout: Duration,
    /// Deadline for writing a single response.
    #[serde(with = "duration_secs")]
    pub write_timeout: Duration,
    /// Deadline for a keep-alive connection to send its next request.
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,
    /// TLS material; plain TCP when absent.
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_owned(),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            tls: None,
        }
    }
}

impl ServerConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// [`ServerError::ConfigRead`] when the file cannot be read,
    /// [`ServerError::ConfigParse`] when it is not valid configuration JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| ServerError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_slice(&data).map_err(|e| ServerError::ConfigParse {
            path: path.display().to_string(),
            source: e,
        })
    }
}

// Serde adapter: whole seconds on the wire, `Duration` in memory.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Per-connection deadlines, copied out of the config at accept time.
#[derive(Debug, Clone, Copy)]
struct Deadlines {
    read: Duration,
    write: Duration,
    idle: Duration,
}

/// The rill HTTP server.
///
/// Binds to a TCP address per its [`ServerConfig`] and dispatches incoming
/// HTTP/1.1 requests through a [`Router`].
///
/// # Examples
///
/// ```rust,no_run
/// use rill::{Router, Response, StatusCode};
/// use rill::server::{Server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new();
///     router.get("/ping", |_ctx| async { Response::new(StatusCode::Ok).body("pong") });
///
///     let server = Server::bind(ServerConfig::default()).await?;
///     server.run(router).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    tls: Option<TlsAcceptor>,
    config: ServerConfig,
}

impl Server {
    /// Binds the server to the configured address, loading TLS material
    /// first when configured.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound, and
    /// [`ServerError::TlsMaterial`], [`ServerError::MissingPrivateKey`], or
    /// [`ServerError::Tls`] if the TLS certificate or key is unreadable or
    /// malformed. All are fatal: the server never starts with broken TLS.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let tls = config.tls.as_ref().map(load_tls_acceptor).transpose()?;

        let listener =
            TcpListener::bind(&config.addr)
                .await
                .map_err(|e| ServerError::Bind {
                    addr: config.addr.clone(),
                    source: e,
                })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            tls,
            config,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections and dispatching requests through `router`.
    ///
    /// Blocks until a termination signal (SIGINT/SIGTERM) arrives, then
    /// drains in-flight requests before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run(self, router: Router) -> Result<(), ServerError> {
        self.run_until(router, shutdown_signal()).await
    }

    /// Like [`run`](Self::run) but with a caller-supplied shutdown future in
    /// place of the process signal handler.
    pub async fn run_until(
        self,
        router: Router,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), ServerError> {
        let router = Arc::new(router);
        let deadlines = Deadlines {
            read: self.config.read_timeout,
            write: self.config.write_timeout,
            idle: self.config.idle_timeout,
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connections = JoinSet::new();

        info!(address = %self.local_addr, tls = self.tls.is_some(), "rill listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };

                    debug!(peer = %peer_addr, "connection accepted");
                    let router = Arc::clone(&router);
                    let tls = self.tls.clone();
                    let shutdown_rx = shutdown_rx.clone();

                    connections.spawn(async move {
                        let result = match tls {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(stream) => {
                                    handle_connection(stream, peer_addr, router, deadlines, shutdown_rx)
                                        .await
                                }
                                Err(e) => {
                                    warn!(peer = %peer_addr, error = %e, "TLS handshake failed");
                                    Ok(())
                                }
                            },
                            None => {
                                handle_connection(stream, peer_addr, router, deadlines, shutdown_rx)
                                    .await
                            }
                        };
                        if let Err(e) = result {
                            warn!(peer = %peer_addr, error = %e, "connection closed with error");
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("shutdown signal received — draining in-flight requests");
                    break;
                }
            }
        }

        // Stop accepting, tell open connections to wind down, wait them out.
        let _ = shutdown_tx.send(true);
        while connections.join_next().await.is_some() {}
        info!("server stopped");
        Ok(())
    }
}

// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// Builds a TLS acceptor from PEM files. Any failure here is a startup abort.
fn load_tls_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, ServerError> {
    let read = |path: &PathBuf| {
        std::fs::read(path).map_err(|e| ServerError::TlsMaterial {
            path: path.display().to_string(),
            source: e,
        })
    };

    let cert_pem = read(&config.cert_file)?;
    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::TlsMaterial {
            path: config.cert_file.display().to_string(),
            source: e,
        })?;

    let key_pem = read(&config.key_file)?;
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| ServerError::TlsMaterial {
            path: config.key_file.display().to_string(),
            source: e,
        })?
        .ok_or_else(|| ServerError::MissingPrivateKey {
            path: config.key_file.display().to_string(),
        })?;

    let tls = tokio_rustls::rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(TlsAcceptor::from(Arc::new(tls)))
}

/// Handles a single connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes, a deadline expires, or the
/// server begins shutting down. The idle deadline applies while waiting for
/// a follow-up request on a kept-alive connection; the read deadline applies
/// while a request is arriving.
async fn handle_connection<S>(
    mut stream: S,
    peer_addr: SocketAddr,
    router: Arc<Router>,
    deadlines: Deadlines,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
    let mut served = 0usize;

    loop {
        let read_deadline = if buf.is_empty() && served > 0 {
            deadlines.idle
        } else {
            deadlines.read
        };

        let bytes_read = tokio::select! {
            read = timeout(read_deadline, stream.read_buf(&mut buf)) => match read {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(peer = %peer_addr, "read deadline expired");
                    break;
                }
            },
            _ = shutdown.changed() => {
                debug!(peer = %peer_addr, "shutdown — closing connection");
                break;
            }
        };

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        // Guard against excessively large requests.
        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large — sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            write_response(&mut stream, response, deadlines.write).await?;
            break;
        }

        // Attempt to parse the buffered data as an HTTP request.
        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                // Headers not yet fully received — read more data.
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                write_response(&mut stream, response, deadlines.write).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        let content_length = request.content_length().unwrap_or(0);
        let total_needed = body_offset + content_length;
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = router.dispatch(request).await.keep_alive(keep_alive);
        write_response(&mut stream, response, deadlines.write).await?;
        served += 1;

        // Drop the consumed request bytes from the buffer.
        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            break;
        }
    }

    Ok(())
}

// Writes and flushes a response under the write deadline. A missed deadline
// surfaces as `TimedOut`.
async fn write_response<S>(
    stream: &mut S,
    response: Response,
    deadline: Duration,
) -> Result<(), std::io::Error>
where
    S: AsyncWrite + Unpin + Send,
{
    let write = async {
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await
    };
    timeout(deadline, write)
        .await
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))?
}
