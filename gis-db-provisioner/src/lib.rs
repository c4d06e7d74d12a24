//! GIS database provisioner
//!
//! Brings a PostgreSQL database for the mapping product to its provisioned
//! state: database, schema, read/write/admin login roles with their grants,
//! spatial extensions and extension object ownership. Safe to run repeatedly.

pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod provision;
pub mod secrets;
pub mod ssl;

#[cfg(test)]
mod testing;

pub use common::{ConfigExt, RuntimeEnv, Telemetry, TelemetryEvent};
pub use config::{ProvisionConfig, SecretIds, SecretStoreKind};
pub use error::ProvisionError;
pub use handler::{provision, provision_from_env, ProvisionResponse};
pub use provision::{ProvisionReport, Provisioner};
