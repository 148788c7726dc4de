//! Request processing.
//!
//! [`CommandProcessor::dispatch`] turns the first frame of a connection into
//! either a finite reply (every command except SUBSCRIBE) or an accepted
//! subscription, which the listener then hands to
//! [`crate::subscription::serve`]. Validation failures become error replies;
//! nothing in here fails the connection itself.

use crate::context::{Mode, ServerContext};
use crate::registry::{InsertOutcome, RemoveOutcome};
use crate::subscription::{relay_to_new_peer, SubscribeRequest};
use serde_json::Value;
use sharemesh_types::{PeerAddress, Resource};
use sharemesh_wire::{request, Command, Reply, Response, ResultSize};
use std::path::PathBuf;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::task::JoinSet;
use tracing::{debug, info};

pub const INVALID_COMMAND: &str = "Invalid Command";
pub const MISSING_COMMAND: &str = "missing or incorrect type for command";
pub const MISSING_RESOURCE: &str = "missing resource";
pub const INVALID_RESOURCE: &str = "invalid resource";
pub const CANNOT_PUBLISH: &str = "cannot publish resource";
pub const CANNOT_SHARE: &str = "cannot share resource";
pub const CANNOT_REMOVE: &str = "cannot remove resource";
pub const MISSING_RESOURCE_OR_SECRET: &str = "missing resource and/or secret";
pub const INCORRECT_SECRET: &str = "incorrect secret";
pub const MISSING_TEMPLATE: &str = "missing resourceTemplate";
pub const INVALID_TEMPLATE: &str = "invalid resourceTemplate";
pub const NO_SUCH_SLOT: &str = "uri or channel doesn't correspond";
pub const MISSING_FILE: &str = "resource doesn't exist";
pub const INVALID_SERVER_LIST: &str = "missing or invalid server list";

/// One unit of a finite reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// A text frame.
    Frame(String),
    /// Raw file bytes, sent unframed.
    File { path: PathBuf, size: u64 },
}

/// What the connection should do after the first frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Send these and close.
    Reply(Vec<Outgoing>),
    /// Keep the connection open as a subscription.
    Subscribe(SubscribeRequest),
}

fn error(message: &str) -> Vec<Outgoing> {
    vec![Outgoing::Frame(Response::error(message).to_frame())]
}

fn success() -> Vec<Outgoing> {
    vec![Outgoing::Frame(Response::success().to_frame())]
}

fn resource_frame(resource: &Resource) -> Outgoing {
    Outgoing::Frame(resource.to_value().to_string())
}

/// Executes requests against the shared server state.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    ctx: Arc<ServerContext>,
}

impl CommandProcessor {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    /// Process the first frame received on a connection in `mode`.
    pub async fn dispatch(&self, frame: &str, mode: Mode) -> Dispatch {
        let request: Value = match serde_json::from_str(frame) {
            Ok(value) => value,
            Err(_) => return Dispatch::Reply(error(MISSING_COMMAND)),
        };
        let Some(command) = request.get("command").and_then(Value::as_str) else {
            return Dispatch::Reply(error(MISSING_COMMAND));
        };

        let reply = match command {
            "PUBLISH" => self.publish(&request, mode),
            "REMOVE" => self.remove(&request),
            "SHARE" => self.share(&request, mode).await,
            "QUERY" => self.query(&request, mode).await,
            "FETCH" => self.fetch(&request).await,
            "EXCHANGE" => self.exchange(&request, mode),
            "SUBSCRIBE" => match self.subscribe(&request) {
                Ok(accepted) => return Dispatch::Subscribe(accepted),
                Err(reply) => reply,
            },
            _ => error(INVALID_COMMAND),
        };
        Dispatch::Reply(reply)
    }

    fn publish(&self, request: &Value, mode: Mode) -> Vec<Outgoing> {
        let Some(Ok(mut resource)) = request.get("resource").map(Resource::from_value) else {
            return error(MISSING_RESOURCE);
        };
        if resource.has_reserved_owner() {
            return error(INVALID_RESOURCE);
        }
        match resource.absolute_uri() {
            Some(uri) if uri.scheme() != sharemesh_types::resource::FILE_SCHEME => {}
            _ => return error(CANNOT_PUBLISH),
        }
        resource.server_owner = Some(self.ctx.own_address(mode).to_string());
        self.store(resource)
    }

    fn remove(&self, request: &Value) -> Vec<Outgoing> {
        let Some(Ok(resource)) = request.get("resource").map(Resource::from_value) else {
            return error(MISSING_RESOURCE);
        };
        if resource.has_reserved_owner() {
            return error(INVALID_RESOURCE);
        }
        if resource.absolute_uri().is_none() {
            return error(CANNOT_REMOVE);
        }
        match self
            .ctx
            .registry
            .remove(&resource.owner, &resource.channel, &resource.uri)
        {
            RemoveOutcome::Removed => {
                info!(uri = %resource.uri, channel = %resource.channel, "Resource removed");
                success()
            }
            RemoveOutcome::NotFound => error(CANNOT_REMOVE),
        }
    }

    async fn share(&self, request: &Value, mode: Mode) -> Vec<Outgoing> {
        let (Some(resource), Some(secret)) = (
            request.get("resource"),
            request.get("secret").and_then(Value::as_str),
        ) else {
            return error(MISSING_RESOURCE_OR_SECRET);
        };
        let expected = self.ctx.config.secret.as_bytes();
        if !bool::from(secret.as_bytes().ct_eq(expected)) {
            return error(INCORRECT_SECRET);
        }
        let Ok(mut resource) = Resource::from_value(resource) else {
            return error(MISSING_RESOURCE);
        };
        if resource.has_reserved_owner() {
            return error(INVALID_RESOURCE);
        }
        let Some(path) = resource.local_path() else {
            return error(CANNOT_SHARE);
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return error(CANNOT_SHARE),
        }
        resource.server_owner = Some(self.ctx.own_address(mode).to_string());
        self.store(resource)
    }

    /// Insert into the registry and notify subscribers. A slot held by
    /// another owner is reported the same way for PUBLISH and SHARE.
    fn store(&self, resource: Resource) -> Vec<Outgoing> {
        match self.ctx.registry.insert(resource.clone()) {
            InsertOutcome::Conflict => error(CANNOT_SHARE),
            outcome => {
                info!(
                    uri = %resource.uri,
                    channel = %resource.channel,
                    ?outcome,
                    "Resource stored"
                );
                let notified = self.ctx.subscriptions.notify(&resource);
                if notified > 0 {
                    debug!(uri = %resource.uri, notified, "Notified subscribers");
                }
                success()
            }
        }
    }

    async fn query(&self, request: &Value, mode: Mode) -> Vec<Outgoing> {
        let (Some(template), Some(relay)) = (
            request.get("resourceTemplate"),
            request.get("relay").and_then(Value::as_bool),
        ) else {
            return error(MISSING_TEMPLATE);
        };
        let Ok(template) = Resource::from_value(template) else {
            return error(MISSING_TEMPLATE);
        };
        if template.has_reserved_owner() {
            return error(INVALID_TEMPLATE);
        }

        let mut results = self.ctx.registry.query(&template);
        if relay {
            results.extend(self.relay_query(&template, mode).await);
        }

        let mut reply = success();
        reply.extend(results.iter().map(resource_frame));
        reply.push(Outgoing::Frame(
            ResultSize::new(results.len() as u64).to_frame(),
        ));
        reply
    }

    /// Ask every other known peer in `mode` the same question, without
    /// further relaying, and collect the resources they return.
    async fn relay_query(&self, template: &Resource, mode: Mode) -> Vec<Resource> {
        let Some(transport) = self.ctx.transport(mode) else {
            return Vec::new();
        };
        let command = Command::Query {
            resource_template: Resource {
                owner: String::new(),
                channel: String::new(),
                ..template.clone()
            },
            relay: false,
        };
        let timeout = self.ctx.read_timeout();

        let mut tasks = JoinSet::new();
        for peer in self.ctx.directory(mode).others() {
            let transport = Arc::clone(&transport);
            let command = command.clone();
            tasks.spawn(async move {
                match request(transport.as_ref(), &peer, &command, timeout).await {
                    Ok(frames) => frames,
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "Query relay failed");
                        Vec::new()
                    }
                }
            });
        }

        let mut found = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok(frames) = joined else { continue };
            for frame in frames {
                if let Ok(Reply::Resource(resource)) = Reply::parse(&frame) {
                    found.push(resource);
                }
            }
        }
        found
    }

    async fn fetch(&self, request: &Value) -> Vec<Outgoing> {
        let Some(template) = request.get("resourceTemplate") else {
            return error(MISSING_TEMPLATE);
        };
        let Ok(template) = Resource::from_value(template) else {
            return error(MISSING_TEMPLATE);
        };
        if template.has_reserved_owner() {
            return error(INVALID_TEMPLATE);
        }
        let Some(path) = template.local_path() else {
            return error(INVALID_TEMPLATE);
        };
        let Some(stored) = self.ctx.registry.find_slot(&template.channel, &template.uri) else {
            return error(NO_SUCH_SLOT);
        };
        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return error(MISSING_FILE),
        };

        let metadata = Resource {
            owner: sharemesh_types::resource::ANONYMOUS_OWNER.to_string(),
            server_owner: Some(self.ctx.own_address(Mode::Plain).to_string()),
            size: Some(size),
            ..stored
        };
        let mut reply = success();
        reply.push(resource_frame(&metadata));
        reply.push(Outgoing::File { path, size });
        reply.push(Outgoing::Frame(ResultSize::new(1).to_frame()));
        reply
    }

    fn exchange(&self, request: &Value, mode: Mode) -> Vec<Outgoing> {
        let Some(entries) = request.get("serverList").and_then(Value::as_array) else {
            return error(INVALID_SERVER_LIST);
        };
        let directory = self.ctx.directory(mode);
        for entry in entries {
            let Some(peer) = PeerAddress::from_value(entry) else {
                debug!(entry = %entry, "Skipping malformed server list entry");
                continue;
            };
            if directory.add(peer.clone()) {
                info!(peer = %peer, mode = %mode, "Discovered peer");
                relay_to_new_peer(&self.ctx, mode, &peer);
            }
        }
        success()
    }

    fn subscribe(&self, request: &Value) -> Result<SubscribeRequest, Vec<Outgoing>> {
        let (Some(template), Some(relay), Some(id)) = (
            request.get("resourceTemplate"),
            request.get("relay").and_then(Value::as_bool),
            request.get("id").and_then(Value::as_str),
        ) else {
            return Err(error(MISSING_TEMPLATE));
        };
        let Ok(template) = Resource::from_value(template) else {
            return Err(error(INVALID_TEMPLATE));
        };
        if template.has_reserved_owner() {
            return Err(error(INVALID_TEMPLATE));
        }
        Ok(SubscribeRequest {
            id: id.to_string(),
            template,
            relay,
        })
    }
}
