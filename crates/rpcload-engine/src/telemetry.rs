//! Log output initialization
//!
//! Installs a global `tracing` subscriber that writes formatted events to
//! stdout. The filter is read from `RUST_LOG` and falls back to
//! `info,rpcload=debug`.
//!
//! # Example
//! ```no_run
//! rpcload_engine::telemetry::init_logging()
//!     .expect("Failed to initialize logging");
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry};

/// Default filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info,rpcload=debug";

/// Initialize the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging() -> Result<(), TryInitError> {
    init_with_filter(env_filter())
}

/// Initialize the global subscriber with an explicit filter directive.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_with_directives(directives: &str) -> Result<(), TryInitError> {
    init_with_filter(EnvFilter::new(directives))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn init_with_filter(env_filter: EnvFilter) -> Result<(), TryInitError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    Registry::default().with(env_filter).with(fmt_layer).try_init()
}
