//! sharemesh wire protocol.
//!
//! Servers and clients talk over TCP (optionally TLS) using length-prefixed
//! text frames, each carrying one JSON document.
//!
//! ## Architecture
//!
//! - **frame**: the u16 length-prefixed frame codec
//! - **message**: typed commands and replies carried in frames
//! - **transport**: plain and TLS stream factories behind one trait
//! - **connection**: framed read/write halves plus the one-shot and
//!   persistent outbound connection patterns
//! - **rate_limit**: per-source-IP connection spacing for listeners

pub mod connection;
pub mod error;
pub mod frame;
pub mod message;
pub mod rate_limit;
pub mod transport;

pub use connection::{open_persistent, request, split, FrameReader, FrameWriter};
pub use error::{WireError, WireResult};
pub use message::{Command, Reply, Response, ResultSize, Status};
pub use rate_limit::ConnectionRateLimiter;
pub use transport::{BoxedStream, PlainTransport, TlsTransport, Transport};
