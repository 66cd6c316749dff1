//! WASI HTTP server entry point for the pairing signaling server
//!
//! This module provides the main entry point when running as a WASI HTTP component
//! using `wasmtime serve`.

use pairbox_server_wasm::{ServerConfig, ServerState, handle_request, logging};
use std::cell::RefCell;
use wstd::http::{Body, Request, Response};

// Thread-local state for the server (WASI is single-threaded)
thread_local! {
    static STATE: RefCell<Option<ServerState>> = const { RefCell::new(None) };
}

fn get_or_init_state() -> ServerState {
    STATE.with(|s| {
        s.borrow_mut()
            .get_or_insert_with(|| {
                logging::init();
                let config = ServerConfig::from_env();
                tracing::info!(
                    state_file = ?config.state_file,
                    idle_timeout_secs = config.idle_timeout.as_secs(),
                    "Starting pairbox signaling server"
                );
                ServerState::with_config(&config)
            })
            .clone()
    })
}

/// The main HTTP handler for WASI
///
/// This function is called by the WASI runtime for each incoming HTTP request.
#[wstd::http_server]
async fn main(request: Request<Body>) -> Result<Response<Body>, wstd::http::Error> {
    let state = get_or_init_state();
    handle_request(request, &state).await
}
