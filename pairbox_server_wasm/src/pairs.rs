//! Symmetric table of matched connections

use pairbox_protocol::ConnectionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Each pairing is stored in both directions so either side can find the other.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PairTable {
    peers: HashMap<ConnectionId, ConnectionId>,
}

impl PairTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `a <-> b`.
    ///
    /// Both sides must already be unpaired; a stale entry would otherwise
    /// be overwritten and leave its old partner half-paired.
    pub fn pair(&mut self, a: ConnectionId, b: ConnectionId) {
        debug_assert!(!self.peers.contains_key(&a) && !self.peers.contains_key(&b));
        self.peers.insert(a, b);
        self.peers.insert(b, a);
    }

    pub fn peer_of(&self, id: &ConnectionId) -> Option<ConnectionId> {
        self.peers.get(id).copied()
    }

    /// Removes both directions of the pairing that contains `id` and returns
    /// the former partner.
    pub fn unpair(&mut self, id: &ConnectionId) -> Option<ConnectionId> {
        let peer = self.peers.remove(id)?;
        if self.peers.get(&peer) == Some(id) {
            self.peers.remove(&peer);
        }
        Some(peer)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.peers.contains_key(id)
    }

    /// Number of pairings (not entries)
    pub fn len(&self) -> usize {
        self.peers.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConnectionId, &ConnectionId)> {
        self.peers.iter()
    }
}
