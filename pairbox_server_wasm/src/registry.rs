//! Live connections and their per-connection state

use pairbox_protocol::ConnectionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a connection stands in the pairing lifecycle.
///
/// A destroyed connection has no entry at all.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Registered, neither waiting nor paired
    #[default]
    Idle,
    /// In the wait queue
    Waiting,
    /// Matched with the given connection
    Paired(ConnectionId),
}

/// One live connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection<O> {
    pub outbox: O,
    pub state: ConnectionState,
    /// Milliseconds since the UNIX epoch of the last poll or inbound event
    pub last_seen: u64,
}

/// Authoritative set of live connections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRegistry<O> {
    connections: HashMap<ConnectionId, Connection<O>>,
}

impl<O> Default for ConnectionRegistry<O> {
    fn default() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }
}

impl<O> ConnectionRegistry<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection in the `Idle` state, replacing any previous entry.
    pub fn register(&mut self, id: ConnectionId, outbox: O, now: u64) {
        self.connections.insert(
            id,
            Connection {
                outbox,
                state: ConnectionState::Idle,
                last_seen: now,
            },
        );
    }

    pub fn unregister(&mut self, id: &ConnectionId) -> Option<Connection<O>> {
        self.connections.remove(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Connection<O>> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection<O>> {
        self.connections.get_mut(id)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn state(&self, id: &ConnectionId) -> Option<ConnectionState> {
        self.connections.get(id).map(|c| c.state)
    }

    /// Sets the state tag of a registered connection; unknown ids are ignored.
    pub fn set_state(&mut self, id: &ConnectionId, state: ConnectionState) {
        if let Some(connection) = self.connections.get_mut(id) {
            connection.state = state;
        }
    }

    /// Refreshes liveness. Returns false for unknown ids.
    pub fn touch(&mut self, id: &ConnectionId, now: u64) -> bool {
        match self.connections.get_mut(id) {
            Some(connection) => {
                connection.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Connections not seen since `cutoff`
    pub fn idle_since(&self, cutoff: u64) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, c)| c.last_seen < cutoff)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ConnectionId> {
        self.connections.keys()
    }
}
