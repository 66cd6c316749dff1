//! FIFO of connections waiting for a partner

use pairbox_protocol::ConnectionId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Connections that asked for a match and have none yet, oldest first.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct WaitQueue {
    waiting: VecDeque<ConnectionId>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes `id` wherever it sits. Returns whether it was present.
    pub fn remove(&mut self, id: &ConnectionId) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|waiting| waiting != id);
        self.waiting.len() != before
    }

    /// Appends `id` at the tail.
    ///
    /// Callers remove `id` first; the queue does not deduplicate on its own.
    pub fn enqueue(&mut self, id: ConnectionId) {
        self.waiting.push_back(id);
    }

    /// Takes the longest-waiting connection, if any.
    pub fn pop_front(&mut self) -> Option<ConnectionId> {
        self.waiting.pop_front()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.waiting.contains(id)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionId> {
        self.waiting.iter()
    }
}
