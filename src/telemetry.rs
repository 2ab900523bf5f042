//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; applications embedding it decide
//! whether to install a subscriber. `init_tracing` is the one-liner for the
//! common case.

use tracing_subscriber::EnvFilter;

use crate::error::{AppResult, MotionError};

/// Install a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"apt_motion=debug"`) when it is unset.
///
/// Returns an error instead of panicking if a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| MotionError::Configuration(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| MotionError::Configuration(format!("Tracing already initialised: {}", e)))
}
