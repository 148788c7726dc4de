//! Resource registry.
//!
//! Holds every resource published or shared on this server. At most one
//! resource occupies a `(channel, uri)` slot at a time; the slot belongs to
//! whichever owner registered it until it is removed.

use sharemesh_types::Resource;
use std::sync::{Arc, RwLock};

/// Result of [`ResourceRegistry::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// No resource held the slot.
    Inserted,
    /// The same owner already held the slot; the entry was overwritten in place.
    Replaced,
    /// A different owner holds the slot. Nothing changed.
    Conflict,
}

/// Result of [`ResourceRegistry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// Thread-safe resource store.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: Arc<RwLock<Vec<Resource>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a resource.
    pub fn insert(&self, resource: Resource) -> InsertOutcome {
        let mut resources = self.resources.write().unwrap_or_else(|e| e.into_inner());
        match resources.iter_mut().find(|r| r.same_slot(&resource)) {
            Some(existing) if existing.owner == resource.owner => {
                *existing = resource;
                InsertOutcome::Replaced
            }
            Some(_) => InsertOutcome::Conflict,
            None => {
                resources.push(resource);
                InsertOutcome::Inserted
            }
        }
    }

    /// Remove the resource with exactly this owner, channel and uri.
    pub fn remove(&self, owner: &str, channel: &str, uri: &str) -> RemoveOutcome {
        let mut resources = self.resources.write().unwrap_or_else(|e| e.into_inner());
        match resources
            .iter()
            .position(|r| r.owner == owner && r.channel == channel && r.uri == uri)
        {
            Some(index) => {
                resources.remove(index);
                RemoveOutcome::Removed
            }
            None => RemoveOutcome::NotFound,
        }
    }

    /// All resources matching `template`, anonymized, in registration order.
    pub fn query(&self, template: &Resource) -> Vec<Resource> {
        let resources = self.resources.read().unwrap_or_else(|e| e.into_inner());
        resources
            .iter()
            .filter(|r| template.matches(r))
            .map(Resource::anonymized)
            .collect()
    }

    /// The resource occupying a `(channel, uri)` slot, if any.
    pub fn find_slot(&self, channel: &str, uri: &str) -> Option<Resource> {
        let resources = self.resources.read().unwrap_or_else(|e| e.into_inner());
        resources
            .iter()
            .find(|r| r.channel == channel && r.uri == uri)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.resources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored resource, owners intact.
    pub fn snapshot(&self) -> Vec<Resource> {
        self.resources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
