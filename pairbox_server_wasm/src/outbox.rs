//! Outbound delivery capability of a connection

use pairbox_protocol::JsonServerEvent;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Where events addressed to one connection go.
///
/// Delivery is fire-and-forget: `false` means the event was dropped, and the
/// caller carries on without retrying.
pub trait Outbox {
    fn deliver(&mut self, event: &JsonServerEvent) -> bool;
}

/// Pending events of a long-polling connection, handed out on the next poll.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    events: VecDeque<JsonServerEvent>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every pending event, oldest first.
    pub fn drain(&mut self) -> Vec<JsonServerEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Outbox for Mailbox {
    fn deliver(&mut self, event: &JsonServerEvent) -> bool {
        self.events.push_back(event.clone());
        true
    }
}
