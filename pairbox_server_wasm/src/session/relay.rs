use super::Sessions;
use crate::outbox::Outbox;
use pairbox_protocol::{ConnectionId, JsonServerEvent, SignalKind};
use serde_json::Value;
use tracing::{debug, trace};

impl<O: Outbox> Sessions<O> {
    /// Forwards a signaling or chat payload to the partner of `from`.
    ///
    /// Payloads are never inspected. Without a live partner the event is
    /// dropped. Returns whether it was delivered.
    pub fn relay(&mut self, from: &ConnectionId, kind: SignalKind, data: Value) -> bool {
        let Some(peer) = self.pairs.peer_of(from) else {
            trace!(%from, %kind, "Dropped relay from unpaired connection");
            return false;
        };

        let delivered = self.notify(&peer, JsonServerEvent::signal(kind, data));
        if !delivered {
            debug!(%from, %peer, %kind, "Dropped relay to a vanished partner");
        }
        delivered
    }
}
