//! sharemesh server.
//!
//! A server keeps a registry of resources, answers the eight protocol
//! commands on a plain and an optionally secured listener, gossips its
//! known peers, and forwards live updates to subscribers.
//!
//! ## Architecture
//!
//! - **context**: state shared by every connection (registry, peer
//!   directories, subscriptions, transports)
//! - **registry**: the resource store and its identity rules
//! - **directory**: known peers, one directory per mode
//! - **processor**: turns one request frame into reply frames
//! - **subscription**: live subscriptions and their relay tasks
//! - **gossip**: periodic peer exchange and eviction
//! - **listener**: accept loop, rate limiting and the worker pool
//! - **server**: binds the listeners and starts background tasks

pub mod context;
pub mod directory;
pub mod error;
pub mod gossip;
pub mod listener;
pub mod processor;
pub mod registry;
pub mod server;
pub mod subscription;

pub use context::{Mode, ServerContext};
pub use directory::PeerDirectory;
pub use error::{ServerError, ServerResult};
pub use processor::{CommandProcessor, Dispatch, Outgoing};
pub use registry::{InsertOutcome, RemoveOutcome, ResourceRegistry};
pub use server::{RunningServer, Server};
pub use subscription::{Subscription, SubscriptionHub, SubscriptionState};
