//! Protocol message types.
//!
//! Requests are JSON objects tagged by a `command` field. Replies are a
//! `response` object, a bare resource object, or a `resultSize` trailer.
//! Field names are case-sensitive and fixed by the protocol.

use crate::error::WireResult;
use serde::{Deserialize, Serialize};
use sharemesh_types::{PeerAddress, Resource};

/// A request sent to a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "UPPERCASE")]
pub enum Command {
    /// Register a resource with a non-file URI.
    Publish { resource: Resource },
    /// Remove a resource by exact identity.
    Remove { resource: Resource },
    /// Register a file resource on the serving host. Requires the shared secret.
    Share { resource: Resource, secret: String },
    /// Match the registry (and optionally peers) against a template.
    Query {
        #[serde(rename = "resourceTemplate")]
        resource_template: Resource,
        relay: bool,
    },
    /// Download the file behind a shared resource.
    Fetch {
        #[serde(rename = "resourceTemplate")]
        resource_template: Resource,
    },
    /// Offer a list of known servers.
    Exchange {
        #[serde(rename = "serverList")]
        server_list: Vec<PeerAddress>,
    },
    /// Open a live query.
    Subscribe {
        #[serde(rename = "resourceTemplate")]
        resource_template: Resource,
        relay: bool,
        id: String,
    },
    /// Close a live query opened with the same id.
    Unsubscribe { id: String },
}

impl Command {
    /// Serialize to frame text.
    pub fn to_frame(&self) -> WireResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Outcome carried in a `response` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// A `{"response": ...}` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub response: Status,
    #[serde(
        rename = "errorMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Response {
    /// `{"response":"success"}`
    pub fn success() -> Self {
        Self {
            response: Status::Success,
            error_message: None,
            id: None,
        }
    }

    /// `{"response":"error","errorMessage":...}`
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            response: Status::Error,
            error_message: Some(message.into()),
            id: None,
        }
    }

    /// `{"response":"success","id":...}`, the subscription acknowledgement.
    pub fn subscribed(id: impl Into<String>) -> Self {
        Self {
            response: Status::Success,
            error_message: None,
            id: Some(id.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.response == Status::Success
    }

    /// Serialize to frame text.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A `{"resultSize": n}` trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSize {
    #[serde(rename = "resultSize")]
    pub result_size: u64,
}

impl ResultSize {
    pub fn new(result_size: u64) -> Self {
        Self { result_size }
    }

    /// Serialize to frame text.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A frame received from a server, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Response(Response),
    ResultSize(u64),
    Resource(Resource),
    Unknown(serde_json::Value),
}

impl Reply {
    /// Classify frame text.
    ///
    /// Objects with a `response` field are responses, objects with a
    /// `resultSize` field are trailers, and objects with a `uri` field that
    /// pass resource validation are resources. Anything else is `Unknown`.
    pub fn parse(frame: &str) -> WireResult<Self> {
        let value: serde_json::Value = serde_json::from_str(frame)?;
        if value.get("response").is_some() {
            return Ok(match serde_json::from_value::<Response>(value.clone()) {
                Ok(r) => Reply::Response(r),
                Err(_) => Reply::Unknown(value),
            });
        }
        if let Some(size) = value.get("resultSize") {
            return Ok(match size.as_u64() {
                Some(n) => Reply::ResultSize(n),
                None => Reply::Unknown(value),
            });
        }
        if value.get("uri").is_some() {
            if let Ok(resource) = Resource::from_value(&value) {
                return Ok(Reply::Resource(resource));
            }
        }
        Ok(Reply::Unknown(value))
    }

    /// Whether this is a success response.
    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Response(r) if r.is_success())
    }
}
