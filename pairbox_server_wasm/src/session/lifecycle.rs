use super::Sessions;
use crate::error::SignalingError;
use crate::outbox::Outbox;
use crate::registry::ConnectionState;
use pairbox_protocol::{ConnectionId, JsonServerEvent};
use std::time::Duration;
use tracing::{debug, info, warn};

impl<O: Outbox> Sessions<O> {
    /// Registers a new connection and queues its `id-assigned` event.
    pub fn connect(&mut self, id: ConnectionId, outbox: O, now: u64) {
        self.registry.register(id, outbox, now);
        self.notify(&id, JsonServerEvent::IdAssigned(id));
        info!(%id, "Connection opened");
    }

    /// Ends the session of `id` without looking for a new one.
    ///
    /// Leaving while idle (or while unknown) is a no-op. Returns the former
    /// partner, if any.
    pub fn leave(&mut self, id: &ConnectionId) -> Result<Option<ConnectionId>, SignalingError> {
        if self.registry.contains(id) {
            self.check_consistency(id)?;
        }

        self.queue.remove(id);
        let peer = self.unpair_and_notify(id);
        self.registry.set_state(id, ConnectionState::Idle);
        if let Some(peer) = peer {
            debug!(%id, %peer, "Left session");
        }
        Ok(peer)
    }

    /// Purges `id` from every table. The terminal transition of a connection.
    ///
    /// Inconsistent state does not abort a disconnect; it is logged and the
    /// connection is removed anyway. Returns whether `id` was registered.
    pub fn disconnect(&mut self, id: &ConnectionId) -> bool {
        if let Err(err @ SignalingError::InvariantViolation { .. }) = self.check_consistency(id) {
            warn!(%id, error = %err, "Purging inconsistent connection");
        }

        self.queue.remove(id);
        let peer = self.unpair_and_notify(id);
        let registered = self.registry.unregister(id).is_some();
        if registered {
            info!(%id, peer = ?peer, "Connection closed");
        }
        registered
    }

    /// Disconnects every connection not seen within `timeout` of `now`.
    pub fn reap_idle(&mut self, now: u64, timeout: Duration) -> Vec<ConnectionId> {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let cutoff = now.saturating_sub(timeout_ms);
        let idle = self.registry.idle_since(cutoff);
        for id in &idle {
            info!(%id, "Reaping idle connection");
            self.disconnect(id);
        }
        idle
    }
}
