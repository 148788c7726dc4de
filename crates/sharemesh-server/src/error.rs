//! Server error types.

use thiserror::Error;

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// Socket-level failure on a bound listener.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias for server results.
pub type ServerResult<T> = Result<T, ServerError>;
