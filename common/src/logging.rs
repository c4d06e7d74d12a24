//! Structured logging initialization
//!
//! Provides consistent logging initialization for the provisioner binaries.

use crate::config::ConfigExt;
use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Guard that keeps the tracing subscriber active.
/// Drop this at the end of main to flush logs.
pub struct LogGuard;

/// Initialize structured logging for a component.
///
/// Events are written to stderr; stdout is reserved for the result line.
/// Set `LOG_FORMAT=json` to emit one JSON object per event, which is what log
/// collectors in the function runtime expect. Any other value keeps the
/// human-readable format.
///
/// # Example
/// ```ignore
/// let _guard = init_logging("provision-database");
/// info!("Starting up...");
/// ```
pub fn init_logging(component: &str) -> LogGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = String::env_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_target(false)
                    .with_writer(log_writer),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(log_writer))
            .init();
    }

    tracing::debug!(component, json, "Logging initialized");
    LogGuard
}

fn log_writer() -> io::Stderr {
    io::stderr()
}
