//! Wire events exchanged between pairbox clients and the signaling server.
//!
//! Every event is a JSON object carrying its name under `event` and, for
//! events with a payload, the payload under `data`:
//!
//! ```json
//! {"event": "find-match"}
//! {"event": "offer", "data": {"type": "offer", "sdp": "..."}}
//! ```
//!
//! Signaling payloads are opaque to the server and forwarded unchanged.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Transport-assigned identifier of one live connection.
///
/// A new connection always gets a fresh id, even when it comes from the same
/// client as an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        ConnectionId(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ConnectionId)
    }
}

/// The session-scoped events relayed verbatim between paired connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    ChatMessage,
}

impl SignalKind {
    /// Event name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
            SignalKind::ChatMessage => "chat-message",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events sent from a client to the server
///
/// A relay event sent without `data` carries `S::default()` (JSON `null`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
#[serde(
    from = "InboundClientEvent<S>",
    bound(deserialize = "S: Deserialize<'de> + Default")
)]
pub enum ClientEvent<S> {
    /// Leave any current session and look for a new partner
    FindMatch,
    Offer(S),
    Answer(S),
    IceCandidate(S),
    ChatMessage(S),
    /// End the current session without looking for a new one
    LeaveChat,
    /// Only refreshes the connection's liveness
    KeepAlive,
}

/// Wire shape of [`ClientEvent`] with optional relay payloads
#[derive(Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
enum InboundClientEvent<S> {
    FindMatch,
    Offer(Option<S>),
    Answer(Option<S>),
    IceCandidate(Option<S>),
    ChatMessage(Option<S>),
    LeaveChat,
    KeepAlive,
}

impl<S: Default> From<InboundClientEvent<S>> for ClientEvent<S> {
    fn from(event: InboundClientEvent<S>) -> Self {
        match event {
            InboundClientEvent::FindMatch => ClientEvent::FindMatch,
            InboundClientEvent::Offer(data) => ClientEvent::Offer(data.unwrap_or_default()),
            InboundClientEvent::Answer(data) => ClientEvent::Answer(data.unwrap_or_default()),
            InboundClientEvent::IceCandidate(data) => {
                ClientEvent::IceCandidate(data.unwrap_or_default())
            }
            InboundClientEvent::ChatMessage(data) => {
                ClientEvent::ChatMessage(data.unwrap_or_default())
            }
            InboundClientEvent::LeaveChat => ClientEvent::LeaveChat,
            InboundClientEvent::KeepAlive => ClientEvent::KeepAlive,
        }
    }
}

/// Events sent from the server to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent<S> {
    /// First event of every connection
    IdAssigned(ConnectionId),
    /// A partner was found; sent once to each side of the new pair
    Matched,
    /// The partner left the session or disconnected
    UserDisconnected,
    Offer(S),
    Answer(S),
    IceCandidate(S),
    ChatMessage(S),
}

impl<S> ServerEvent<S> {
    /// Rebuilds a relayed signal for delivery to the partner.
    pub fn signal(kind: SignalKind, data: S) -> Self {
        match kind {
            SignalKind::Offer => ServerEvent::Offer(data),
            SignalKind::Answer => ServerEvent::Answer(data),
            SignalKind::IceCandidate => ServerEvent::IceCandidate(data),
            SignalKind::ChatMessage => ServerEvent::ChatMessage(data),
        }
    }

    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::IdAssigned(_) => "id-assigned",
            ServerEvent::Matched => "matched",
            ServerEvent::UserDisconnected => "user-disconnected",
            ServerEvent::Offer(_) => SignalKind::Offer.as_str(),
            ServerEvent::Answer(_) => SignalKind::Answer.as_str(),
            ServerEvent::IceCandidate(_) => SignalKind::IceCandidate.as_str(),
            ServerEvent::ChatMessage(_) => SignalKind::ChatMessage.as_str(),
        }
    }
}

#[cfg(feature = "json")]
pub use json::*;

#[cfg(feature = "json")]
mod json {
    use super::{ClientEvent, ServerEvent};
    use std::{fmt, str::FromStr};

    pub type JsonClientEvent = ClientEvent<serde_json::Value>;
    pub type JsonServerEvent = ServerEvent<serde_json::Value>;

    impl fmt::Display for JsonClientEvent {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
            f.write_str(&json)
        }
    }

    impl FromStr for JsonClientEvent {
        type Err = serde_json::Error;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            serde_json::from_str(s)
        }
    }

    impl fmt::Display for JsonServerEvent {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
            f.write_str(&json)
        }
    }

    impl FromStr for JsonServerEvent {
        type Err = serde_json::Error;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            serde_json::from_str(s)
        }
    }
}
