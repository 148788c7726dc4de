//! Shared error types for sharemesh.

use thiserror::Error;

/// Top-level error type for the data model and configuration.
#[derive(Error, Debug)]
pub enum SharemeshError {
    /// A resource or template object failed structural validation.
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// A peer address could not be parsed.
    #[error("Invalid peer address: {0}")]
    InvalidPeer(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias for Result with SharemeshError.
pub type SharemeshResult<T> = Result<T, SharemeshError>;
