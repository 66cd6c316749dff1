//! Tracing setup

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// The WASI entry point can run once per request, so repeated calls are
/// ignored rather than treated as an error.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
