use super::Sessions;
use crate::error::SignalingError;
use crate::outbox::Outbox;
use crate::registry::ConnectionState;
use pairbox_protocol::{ConnectionId, JsonServerEvent};
use tracing::{debug, error, info, warn};

/// Result of a `find-match` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Paired with the longest-waiting connection
    Matched(ConnectionId),
    /// Nobody was waiting; the requester is now at the tail of the queue
    Waiting,
}

impl<O: Outbox> Sessions<O> {
    /// Drops any current session of `id`, then pairs it with the head of the
    /// wait queue or queues it.
    ///
    /// A requester that is already paired abandons that session: the old
    /// partner gets `user-disconnected` and goes back to idle.
    pub fn request_match(&mut self, id: ConnectionId) -> Result<MatchOutcome, SignalingError> {
        self.check_consistency(&id)?;

        // The partner is chosen before anything is mutated so a corrupted
        // head aborts the whole request.
        if let Some(head) = self.queue.iter().copied().find(|waiting| *waiting != id) {
            let head_state = self.registry.state(&head);
            if self.pairs.contains(&head)
                || head_state.is_some_and(|s| s != ConnectionState::Waiting)
            {
                let detail = format!("queue head {head} is {head_state:?}");
                error!(%id, %detail, "Session invariant violated; transition aborted");
                return Err(SignalingError::InvariantViolation { id, detail });
            }
        }

        debug!(%id, "Match requested");
        self.queue.remove(&id);
        if let Some(previous) = self.unpair_and_notify(&id) {
            debug!(%id, peer = %previous, "Abandoned previous session");
        }

        match self.queue.pop_front() {
            Some(other) => {
                self.pairs.pair(id, other);
                self.registry.set_state(&id, ConnectionState::Paired(other));
                self.registry.set_state(&other, ConnectionState::Paired(id));

                self.notify(&id, JsonServerEvent::Matched);
                if !self.notify(&other, JsonServerEvent::Matched) && !self.registry.contains(&other) {
                    warn!(%id, peer = %other, "Matched with a connection that already left");
                }

                info!(%id, peer = %other, "Matched");
                Ok(MatchOutcome::Matched(other))
            }
            None => {
                self.queue.enqueue(id);
                self.registry.set_state(&id, ConnectionState::Waiting);
                debug!(%id, "Waiting for a partner");
                Ok(MatchOutcome::Waiting)
            }
        }
    }
}
