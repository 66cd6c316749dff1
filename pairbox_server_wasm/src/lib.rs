//! WASI-compatible random pairing and signaling relay server using wstd
//!
//! Clients connect, ask to be matched with a stranger, and then exchange
//! WebRTC signaling (offer, answer, ICE candidates) and chat messages with
//! their partner through the server until one side leaves. Media never passes
//! through the server.
//!
//! # Protocol
//!
//! Connections are carried over HTTP long-polling:
//!
//! - **GET /poll** - Connect; returns the new connection id and its first events
//! - **GET /poll?id={id}** - Collect pending events
//! - **POST /event** - Send one event (`x-connection-id` header required)
//! - **POST /disconnect** - Close the connection (`x-connection-id` header required)
//! - **GET /health** - Health check
//!
//! ## Events (client → server)
//!
//! - `{"event": "find-match"}` - Leave any current partner and look for a new one
//! - `{"event": "offer" | "answer" | "ice-candidate" | "chat-message", "data": ...}` -
//!   Forwarded unchanged to the partner
//! - `{"event": "leave-chat"}` - End the current session
//! - `{"event": "keep-alive"}`
//!
//! ## Events (server → client)
//!
//! Polls return `{"id": "<uuid>", "events": [...]}` with events such as:
//!
//! - `{"event": "id-assigned", "data": "<uuid>"}`
//! - `{"event": "matched"}` - A partner was found
//! - `{"event": "user-disconnected"}` - The partner left
//! - relayed `offer` / `answer` / `ice-candidate` / `chat-message`
//!
//! A connection that neither polls nor sends for `PAIRBOX_IDLE_TIMEOUT_SECS`
//! is disconnected.
//!
//! # Example
//!
//! ```bash
//! # Start the server
//! wasmtime serve -S common --addr 0.0.0.0:3001 pairbox-signaling-wasm.wasm
//!
//! # Connect (returns id and initial events)
//! curl http://127.0.0.1:3001/poll
//!
//! # Look for a partner
//! curl -X POST -H "x-connection-id: <your-id>" -H "Content-Type: application/json" \
//!   -d '{"event":"find-match"}' http://127.0.0.1:3001/event
//!
//! # Poll for events
//! curl "http://127.0.0.1:3001/poll?id=<your-id>"
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod outbox;
pub mod pairs;
pub mod queue;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod state;

pub use config::ServerConfig;
pub use error::{ClientRequestError, SignalingError};
pub use handler::handle_request;
pub use outbox::{Mailbox, Outbox};
pub use registry::ConnectionState;
pub use session::{MatchOutcome, Sessions};
pub use state::{ServerState, SessionCounts};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the UNIX epoch
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
