//! # portal-logging
//!
//! Structured logging setup for processes embedding the bridge.
//!
//! - [`init_subscriber`] installs a compact stderr `tracing` subscriber
//! - [`init_json_subscriber`] installs a JSON-lines subscriber for log shipping
//! - [`init_from_settings`] installs the stderr subscriber at the configured level
//! - [`capture_logs`] installs a thread-local capture layer for test assertions

#![deny(unsafe_code)]

pub mod capture;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};

use portal_settings::LoggingSettings;
use tracing_subscriber::EnvFilter;

/// Default level when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_LEVEL: &str = "warn";

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` takes precedence over `level`. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber is already set
    let _ = subscriber.try_init();
}

/// Initialize the global tracing subscriber with JSON-lines output on stderr.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}

/// Initialize the stderr subscriber from loaded settings.
///
/// An empty or unparsable `logging.level` falls back to [`DEFAULT_LEVEL`].
pub fn init_from_settings(settings: &LoggingSettings) {
    init_subscriber(effective_level(settings));
}

fn effective_level(settings: &LoggingSettings) -> &str {
    let level = settings.level.trim();
    if level.is_empty() || EnvFilter::try_new(level).is_err() {
        DEFAULT_LEVEL
    } else {
        level
    }
}
