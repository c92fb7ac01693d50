//! Tracing subscriber setup.
//!
//! Binaries call [`init_tracing`] once at start-up. The filter comes from
//! `RUST_LOG` when set, otherwise from the supplied default directive.
//! Output goes to stderr so stdout stays free for command results.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Raised when a global subscriber was already installed.
#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct LoggingInitError(pub String);

/// Install a global `fmt` subscriber filtered by `RUST_LOG` or `default_directive`.
pub fn init_tracing(default_directive: &str) -> Result<(), LoggingInitError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| LoggingInitError(e.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| LoggingInitError(e.to_string()))
}
