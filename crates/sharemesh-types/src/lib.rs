//! Core types for the sharemesh resource directory.
//!
//! This crate defines the data shared by the wire layer, the server and the
//! command-line tool: resources and their matching rules, peer addresses,
//! and server configuration. It contains no networking.

pub mod config;
pub mod error;
pub mod peer;
pub mod resource;

pub use config::{ServerConfig, TlsConfig};
pub use error::{SharemeshError, SharemeshResult};
pub use peer::PeerAddress;
pub use resource::Resource;
