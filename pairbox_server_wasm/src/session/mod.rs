//! Pairing state machine shared by all connections
//!
//! [`Sessions`] owns the connection registry, the wait queue and the pair
//! table. Every method is one complete transition; callers serialize access
//! (see [`crate::state::ServerState`]) so the check-then-act sequences inside
//! never interleave.
//!
//! The transitions are split by concern:
//! - `matching`: `find-match` handling and FIFO pairing
//! - `relay`: forwarding signaling and chat payloads to the partner
//! - `lifecycle`: connect, leave, disconnect and the idle sweep

mod lifecycle;
mod matching;
mod relay;


pub use matching::MatchOutcome;

use crate::error::SignalingError;
use crate::outbox::Outbox;
use crate::pairs::PairTable;
use crate::queue::WaitQueue;
use crate::registry::{ConnectionRegistry, ConnectionState};
use pairbox_protocol::{ClientEvent, ConnectionId, JsonClientEvent, JsonServerEvent, SignalKind};
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

/// Registry, wait queue and pair table, mutated together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sessions<O> {
    registry: ConnectionRegistry<O>,
    queue: WaitQueue,
    pairs: PairTable,
}

impl<O> Default for Sessions<O> {
    fn default() -> Self {
        Self {
            registry: ConnectionRegistry::default(),
            queue: WaitQueue::default(),
            pairs: PairTable::default(),
        }
    }
}

impl<O: Outbox> Sessions<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ConnectionRegistry<O> {
        &self.registry
    }

    pub fn queue(&self) -> &WaitQueue {
        &self.queue
    }

    pub fn pairs(&self) -> &PairTable {
        &self.pairs
    }

    pub fn state_of(&self, id: &ConnectionId) -> Option<ConnectionState> {
        self.registry.state(id)
    }

    pub fn outbox_mut(&mut self, id: &ConnectionId) -> Option<&mut O> {
        self.registry.get_mut(id).map(|c| &mut c.outbox)
    }

    /// Refreshes the liveness of a connection. Returns false for unknown ids.
    pub fn touch(&mut self, id: &ConnectionId, now: u64) -> bool {
        self.registry.touch(id, now)
    }

    /// Applies one inbound event from `id`.
    pub fn handle(
        &mut self,
        id: ConnectionId,
        event: JsonClientEvent,
        now: u64,
    ) -> Result<(), SignalingError> {
        if !self.registry.touch(&id, now) {
            return Err(SignalingError::UnknownConnection(id));
        }

        match event {
            ClientEvent::FindMatch => {
                self.request_match(id)?;
            }
            ClientEvent::LeaveChat => {
                self.leave(&id)?;
            }
            ClientEvent::KeepAlive => {}
            ClientEvent::Offer(data) => {
                self.relay(&id, SignalKind::Offer, data);
            }
            ClientEvent::Answer(data) => {
                self.relay(&id, SignalKind::Answer, data);
            }
            ClientEvent::IceCandidate(data) => {
                self.relay(&id, SignalKind::IceCandidate, data);
            }
            ClientEvent::ChatMessage(data) => {
                self.relay(&id, SignalKind::ChatMessage, data);
            }
        }
        Ok(())
    }

    /// Delivers `event` to `id` if it is still registered.
    ///
    /// Returns whether the event reached the connection's outbox.
    pub fn notify(&mut self, id: &ConnectionId, event: JsonServerEvent) -> bool {
        match self.registry.get_mut(id) {
            Some(connection) => connection.outbox.deliver(&event),
            None => {
                trace!(%id, event = event.name(), "Skipped notification to unknown connection");
                false
            }
        }
    }

    /// Verifies that the state tag of `id` agrees with queue and pair
    /// membership.
    fn check_consistency(&self, id: &ConnectionId) -> Result<ConnectionState, SignalingError> {
        let state = self
            .registry
            .state(id)
            .ok_or(SignalingError::UnknownConnection(*id))?;
        let queued = self.queue.contains(id);
        let peer = self.pairs.peer_of(id);

        if tag_agrees(state, queued, peer) {
            Ok(state)
        } else {
            let detail = format!("tagged {state:?}, queued: {queued}, paired with: {peer:?}");
            error!(%id, %detail, "Session invariant violated; transition aborted");
            Err(SignalingError::InvariantViolation { id: *id, detail })
        }
    }

    /// Removes both directions of the pairing around `id`, returns the
    /// surviving partner to `Idle` and tells it the session ended.
    fn unpair_and_notify(&mut self, id: &ConnectionId) -> Option<ConnectionId> {
        let peer = self.pairs.unpair(id)?;
        if self.registry.state(&peer) == Some(ConnectionState::Paired(*id)) {
            self.registry.set_state(&peer, ConnectionState::Idle);
        }
        self.notify(&peer, JsonServerEvent::UserDisconnected);
        Some(peer)
    }

    /// Checks every structural invariant across all three tables.
    ///
    /// A partner that vanished between being queued and being matched is
    /// tolerated in the pair table.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for id in self.queue.iter() {
            if !seen.insert(*id) {
                return Err(format!("{id} queued twice"));
            }
            if self.pairs.contains(id) {
                return Err(format!("{id} both queued and paired"));
            }
            if !self.registry.contains(id) {
                return Err(format!("{id} queued but not registered"));
            }
        }

        for (a, b) in self.pairs.iter() {
            if self.pairs.peer_of(b) != Some(*a) {
                return Err(format!("{a} -> {b} has no reverse entry"));
            }
            if a == b {
                return Err(format!("{a} paired with itself"));
            }
        }

        for id in self.registry.ids() {
            let state = self.registry.state(id).unwrap_or_default();
            let queued = self.queue.contains(id);
            let peer = self.pairs.peer_of(id);
            if !tag_agrees(state, queued, peer) {
                return Err(format!(
                    "{id} tagged {state:?}, queued: {queued}, paired with: {peer:?}"
                ));
            }
        }
        Ok(())
    }
}

fn tag_agrees(state: ConnectionState, queued: bool, peer: Option<ConnectionId>) -> bool {
    match state {
        ConnectionState::Idle => !queued && peer.is_none(),
        ConnectionState::Waiting => queued && peer.is_none(),
        ConnectionState::Paired(expected) => !queued && peer == Some(expected),
    }
}
