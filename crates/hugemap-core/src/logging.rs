//! Diagnostic output to stderr through `tracing`.

use crate::config::ENV_LOG;
use tracing_subscriber::EnvFilter;

/// Default filter when `HUGEMAP_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Build the filter from `HUGEMAP_LOG`, falling back to [`DEFAULT_FILTER`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a plain-text stderr subscriber.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case the existing one keeps receiving our events.
pub fn init() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .try_init()
        .is_ok()
}
