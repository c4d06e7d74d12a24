//! Shared utilities for the GIS database provisioner
//!
//! This crate provides the ambient functionality used by the provisioner:
//! - Structured logging initialization
//! - Environment variable parsing helpers
//! - Telemetry for reporting provisioning events

pub mod config;
pub mod logging;
pub mod telemetry;

pub use config::{ConfigExt, RuntimeEnv};
pub use logging::init_logging;
pub use telemetry::{Telemetry, TelemetryEvent};
