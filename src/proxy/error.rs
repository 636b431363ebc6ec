//! Error types for proxy operations.
//!
//! Per-request failures (auth, resolution, dialing) are answered with an
//! HTTP status and never surface here. `ProxyError` covers what ends a
//! listener or a client connection.

use thiserror::Error;

/// Unified error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// I/O error (socket operations).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hyper HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Failed to bind the listening socket.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to listen on.
        addr: std::net::SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A required builder field was not set.
    #[error("Proxy server builder is missing {0}")]
    Incomplete(&'static str),

    /// Malformed proxy request.
    #[error("Invalid proxy request: {0}")]
    InvalidRequest(String),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
