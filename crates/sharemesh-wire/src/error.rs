//! Errors from the wire protocol layer.

use thiserror::Error;

/// Errors from framing, transports and peer connections.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Read timed out")]
    Timeout,
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,
    #[error("TLS error: {0}")]
    Tls(String),
}

/// Alias for wire-layer results.
pub type WireResult<T> = Result<T, WireError>;
