//! Logging initialization and configuration.
//!
//! Log output goes to stderr; stdout carries the console line protocol.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "dht_shell=info";

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize logging with an explicit filter directive (e.g. `debug` or
/// `dht_shell=trace`), falling back to the default filter when the
/// directive does not parse.
pub fn init_with_filter(directive: &str) -> Result<(), TryInitError> {
    install(EnvFilter::try_new(directive).unwrap_or_else(|_| default_filter()))
}

/// Try to initialize the logging system.
///
/// Uses the `RUST_LOG` environment variable for filtering. If not set,
/// defaults to `dht_shell=info`. Returns `Err` if logging has already
/// been initialized.
pub fn try_init() -> Result<(), TryInitError> {
    install(default_filter())
}

fn install(filter: EnvFilter) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_idempotent() {
        let _ = try_init();
        // Second call fails because a subscriber is already installed
        let _ = try_init();
    }

    #[test]
    fn test_init_with_filter_after_init() {
        let _ = try_init();
        assert!(init_with_filter("debug").is_err());
    }

    #[test]
    fn test_logging_works() {
        let _ = try_init();

        tracing::info!("test info message");
        tracing::debug!(session = "sess-00000001", "test debug message");
        tracing::warn!("test warn message");
    }
}
