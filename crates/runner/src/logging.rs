//! Logging bootstrap
//!
//! `log` facade with an `env_logger` backend. `RUST_LOG` overrides the
//! default filter.

use env_logger::Env;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Install the global logger with the default filter
pub fn init_logging() {
    init_logging_with(DEFAULT_FILTER);
}

/// Install the global logger; later calls are ignored
pub fn init_logging_with(default_filter: &str) {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init();
}
