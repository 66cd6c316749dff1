//! Error types for the WASM signaling server

use pairbox_protocol::ConnectionId;
use thiserror::Error;

/// Errors that can occur while applying a session transition
#[derive(Error, Debug)]
pub enum SignalingError {
    /// The connection is not (or no longer) registered
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The registry tag for a connection disagrees with queue or pair membership.
    /// The transition was aborted before touching any shared state.
    #[error("Invariant violation for {id}: {detail}")]
    InvariantViolation { id: ConnectionId, detail: String },

    /// Encoding or decoding the state snapshot failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing the state snapshot failed
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] std::io::Error),
}

/// Errors from client requests
#[derive(Error, Debug)]
pub enum ClientRequestError {
    /// The `x-connection-id` header is absent or not a UUID
    #[error("Missing or invalid x-connection-id header")]
    MissingConnectionId,

    /// The request body could not be read
    #[error("Failed to read body: {0}")]
    Body(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Body sent with a content type other than JSON
    #[error("Unsupported message type")]
    UnsupportedType,
}
