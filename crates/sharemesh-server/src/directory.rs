//! Known peers.
//!
//! A server keeps one directory per mode. Each directory always contains
//! the server's own address for that mode; it is advertised in EXCHANGE
//! payloads but never chosen as a gossip target, relayed to, or evicted.

use rand::seq::SliceRandom;
use sharemesh_types::PeerAddress;
use std::sync::{Arc, RwLock};

/// Set of peer addresses with insertion order preserved.
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    own: PeerAddress,
    peers: Arc<RwLock<Vec<PeerAddress>>>,
}

impl PeerDirectory {
    /// Create a directory seeded with this server's own address.
    pub fn new(own: PeerAddress) -> Self {
        Self {
            peers: Arc::new(RwLock::new(vec![own.clone()])),
            own,
        }
    }

    /// This server's address in this directory's mode.
    pub fn own(&self) -> &PeerAddress {
        &self.own
    }

    /// Add a peer. Returns `true` if it was not already known.
    pub fn add(&self, peer: PeerAddress) -> bool {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        if peers.contains(&peer) {
            return false;
        }
        peers.push(peer);
        true
    }

    /// Remove a peer. The own address is never removed.
    pub fn remove(&self, peer: &PeerAddress) -> bool {
        if *peer == self.own {
            return false;
        }
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        let before = peers.len();
        peers.retain(|p| p != peer);
        peers.len() != before
    }

    pub fn contains(&self, peer: &PeerAddress) -> bool {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(peer)
    }

    /// Every entry, own address included.
    pub fn snapshot(&self) -> Vec<PeerAddress> {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Every entry except the own address.
    pub fn others(&self) -> Vec<PeerAddress> {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|p| **p != self.own)
            .cloned()
            .collect()
    }

    /// A uniformly random entry other than the own address.
    pub fn random_other(&self) -> Option<PeerAddress> {
        self.others().choose(&mut rand::thread_rng()).cloned()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
