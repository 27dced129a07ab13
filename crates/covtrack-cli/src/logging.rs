//! Log subscriber setup
//!
//! Library events go to stderr through `tracing-subscriber`. `RUST_LOG`
//! wins over the level derived from `-v` / `-q`.

use crate::config::Verbosity;
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, or from the verbosity when unset or invalid
#[must_use]
pub fn env_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive()))
}

/// Install the global subscriber; a second call is a no-op
pub fn init(verbosity: Verbosity, color: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(color)
        .try_init();
}
