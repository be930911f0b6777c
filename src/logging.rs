//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events: `debug` for every write, `info`
//! for experiment and run lifecycle, `warn` for contended variable creation.
//! Binaries call [`init`] once to see them.

use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "TRUENO_TRACK_LOG";

/// Filter used when neither the caller nor the environment sets one.
pub const DEFAULT_FILTER: &str = "trueno_track=info";

/// Build the effective filter: `TRUENO_TRACK_LOG` wins over `filter`, and an
/// unparsable directive falls back to [`DEFAULT_FILTER`].
#[must_use]
pub fn env_filter(filter: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a `fmt` subscriber writing to stderr.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes. Calling it twice is harmless.
pub fn init(filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(filter))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
