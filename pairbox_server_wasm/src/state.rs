//! Server state shared by request handlers
//!
//! All session tables sit behind one mutex, held for the whole of every
//! transition. When a snapshot file is configured the state is reloaded from
//! it before each transition and written back afterwards, with the snapshot
//! lock held throughout, which lets per-request component instances hand
//! state to each other.

use crate::config::ServerConfig;
use crate::current_timestamp;
use crate::error::SignalingError;
use crate::outbox::Mailbox;
use crate::session::Sessions;
use crate::snapshot::SnapshotFile;
use pairbox_protocol::{ConnectionId, JsonClientEvent, JsonServerEvent};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::warn;

/// Connection counts at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCounts {
    pub connections: usize,
    pub waiting: usize,
    pub pairs: usize,
}

/// Cheaply cloneable handle to the server state
#[derive(Clone)]
pub struct ServerState {
    sessions: Arc<Mutex<Sessions<Mailbox>>>,
    snapshot: Option<SnapshotFile>,
    idle_timeout: Duration,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    /// In-memory state with the default idle timeout
    pub fn new() -> Self {
        Self::with_config(&ServerConfig::in_memory())
    }

    pub fn with_config(config: &ServerConfig) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(Sessions::new())),
            snapshot: config.state_file.clone().map(SnapshotFile::new),
            idle_timeout: config.idle_timeout,
        }
    }

    /// Runs one transition under the lock, after sweeping idle connections.
    fn transition<R>(&self, apply: impl FnOnce(&mut Sessions<Mailbox>, u64) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let _held = self.snapshot.as_ref().and_then(|snapshot| {
            let held = snapshot.lock();
            *sessions = snapshot.load();
            held
        });

        let now = current_timestamp();
        sessions.reap_idle(now, self.idle_timeout);
        let result = apply(&mut *sessions, now);

        if let Some(snapshot) = &self.snapshot {
            if let Err(err) = snapshot.save(&sessions) {
                warn!(path = %snapshot.path().display(), error = %err, "Failed to save state snapshot");
            }
        }
        result
    }

    /// Opens a new connection and returns its id with its first events.
    pub fn connect(&self) -> (ConnectionId, Vec<JsonServerEvent>) {
        self.transition(|sessions, now| connect_inner(sessions, now))
    }

    /// Drains pending events of `id`.
    ///
    /// Without an id, or with one that is no longer live, a new connection
    /// is opened instead. Returns the id the caller must use from now on.
    pub fn poll(&self, id: Option<ConnectionId>) -> (ConnectionId, Vec<JsonServerEvent>) {
        self.transition(|sessions, now| {
            match id.filter(|id| sessions.touch(id, now)) {
                Some(id) => {
                    let events = sessions
                        .outbox_mut(&id)
                        .map(Mailbox::drain)
                        .unwrap_or_default();
                    (id, events)
                }
                None => connect_inner(sessions, now),
            }
        })
    }

    /// Applies one inbound event from `id`.
    pub fn dispatch(&self, id: ConnectionId, event: JsonClientEvent) -> Result<(), SignalingError> {
        self.transition(|sessions, now| sessions.handle(id, event, now))
    }

    /// Closes `id`. Closing an unknown connection is a no-op.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.transition(|sessions, _| sessions.disconnect(&id))
    }

    /// Read-only access to the session tables.
    ///
    /// Picks up the latest snapshot but neither sweeps idle connections nor
    /// writes anything back, so connections past their idle timeout are still
    /// listed until the next transition.
    pub fn inspect<R>(&self, read: impl FnOnce(&Sessions<Mailbox>) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(snapshot) = &self.snapshot {
            *sessions = snapshot.load();
        }
        read(&sessions)
    }

    pub fn counts(&self) -> SessionCounts {
        self.inspect(|sessions| SessionCounts {
            connections: sessions.registry().len(),
            waiting: sessions.queue().len(),
            pairs: sessions.pairs().len(),
        })
    }
}

fn connect_inner(sessions: &mut Sessions<Mailbox>, now: u64) -> (ConnectionId, Vec<JsonServerEvent>) {
    let id: ConnectionId = uuid::Uuid::new_v4().into();
    sessions.connect(id, Mailbox::new(), now);
    let events = sessions
        .outbox_mut(&id)
        .map(Mailbox::drain)
        .unwrap_or_default();
    (id, events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionState;
    use pairbox_protocol::ClientEvent;
    use serde_json::json;

    #[test]
    fn poll_without_id_connects() {
        let state = ServerState::new();
        let (id, events) = state.poll(None);

        assert_eq!(events, vec![JsonServerEvent::IdAssigned(id)]);
        assert_eq!(state.counts().connections, 1);
    }

    #[test]
    fn poll_with_unknown_id_issues_a_new_one() {
        let state = ServerState::new();
        let stale: ConnectionId = uuid::Uuid::new_v4().into();

        let (id, events) = state.poll(Some(stale));
        assert_ne!(id, stale);
        assert_eq!(events, vec![JsonServerEvent::IdAssigned(id)]);
    }

    #[test]
    fn events_are_delivered_on_next_poll() {
        let state = ServerState::new();
        let (a, _) = state.connect();
        let (b, _) = state.connect();

        state.dispatch(a, ClientEvent::FindMatch).unwrap();
        state.dispatch(b, ClientEvent::FindMatch).unwrap();
        state.dispatch(b, ClientEvent::Answer(json!({"sdp": "x"}))).unwrap();

        let (same, events) = state.poll(Some(a));
        assert_eq!(same, a);
        assert_eq!(
            events,
            vec![JsonServerEvent::Matched, JsonServerEvent::Answer(json!({"sdp": "x"}))]
        );
        assert!(state.poll(Some(a)).1.is_empty());
    }

    #[test]
    fn dispatch_from_unknown_connection_fails() {
        let state = ServerState::new();
        let ghost: ConnectionId = uuid::Uuid::new_v4().into();

        let err = state.dispatch(ghost, ClientEvent::FindMatch).unwrap_err();
        assert!(matches!(err, SignalingError::UnknownConnection(_)));
        assert_eq!(state.counts().waiting, 0);
    }

    #[test]
    fn disconnect_notifies_partner() {
        let state = ServerState::new();
        let (a, _) = state.connect();
        let (b, _) = state.connect();
        state.dispatch(a, ClientEvent::FindMatch).unwrap();
        state.dispatch(b, ClientEvent::FindMatch).unwrap();
        state.poll(Some(a));

        assert!(state.disconnect(b));
        assert!(!state.disconnect(b));

        let (_, events) = state.poll(Some(a));
        assert_eq!(events, vec![JsonServerEvent::UserDisconnected]);
        assert_eq!(
            state.inspect(|s| s.state_of(&a)),
            Some(ConnectionState::Idle)
        );
        assert_eq!(
            state.counts(),
            SessionCounts {
                connections: 1,
                waiting: 0,
                pairs: 0
            }
        );
    }

    #[test]
    fn snapshot_hands_state_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            state_file: Some(dir.path().join("state.json")),
            ..ServerConfig::default()
        };

        let first = ServerState::with_config(&config);
        let (a, _) = first.connect();
        first.dispatch(a, ClientEvent::FindMatch).unwrap();

        // a separate instance sees a waiting and pairs with it
        let second = ServerState::with_config(&config);
        let (b, _) = second.connect();
        second.dispatch(b, ClientEvent::FindMatch).unwrap();

        let (_, events) = first.poll(Some(a));
        assert_eq!(events, vec![JsonServerEvent::Matched]);
        assert_eq!(first.inspect(|s| s.pairs().peer_of(&a)), Some(b));
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let state = ServerState::with_config(&ServerConfig {
            state_file: Some(path.clone()),
            ..ServerConfig::default()
        });
        assert_eq!(state.counts().connections, 0);

        // the next write replaces the corrupt file
        let (id, _) = state.connect();
        let reloaded = SnapshotFile::new(path).read().unwrap();
        assert!(reloaded.registry().contains(&id));
    }

    #[test]
    fn stale_snapshot_entries_are_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut stale = Sessions::new();
        let old: ConnectionId = uuid::Uuid::new_v4().into();
        stale.connect(old, Mailbox::new(), 1);
        SnapshotFile::new(path.clone()).save(&stale).unwrap();

        let state = ServerState::with_config(&ServerConfig {
            state_file: Some(path),
            ..ServerConfig::default()
        });
        let (fresh, _) = state.connect();
        assert!(!state.inspect(|s| s.registry().contains(&old)));
        assert_eq!(state.counts().connections, 1);
        assert!(state.inspect(|s| s.registry().contains(&fresh)));
    }

    #[test]
    fn inspect_neither_reaps_nor_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut stale = Sessions::new();
        let old: ConnectionId = uuid::Uuid::new_v4().into();
        stale.connect(old, Mailbox::new(), 1);
        let snapshot = SnapshotFile::new(path.clone());
        snapshot.save(&stale).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let state = ServerState::with_config(&ServerConfig {
            state_file: Some(path.clone()),
            ..ServerConfig::default()
        });
        assert_eq!(state.counts().connections, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }
}
