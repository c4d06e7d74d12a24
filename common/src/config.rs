//! Environment variable parsing helpers
//!
//! Provides ergonomic helpers for reading configuration from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Extension trait for parsing environment variables.
///
/// Provides convenient methods for reading env vars with defaults, required values,
/// and type parsing.
pub trait ConfigExt {
    /// Get an environment variable with a default value.
    ///
    /// # Example
    /// ```ignore
    /// let store = String::env_or("SECRET_STORE", "extension");
    /// ```
    fn env_or(name: &str, default: &str) -> String {
        env::var(name).unwrap_or_else(|_| default.to_string())
    }

    /// Get a required environment variable, returning an error if not set or empty.
    ///
    /// # Example
    /// ```ignore
    /// let db_name = String::env_required("DB_NAME")?;
    /// ```
    fn env_required(name: &str) -> Result<String> {
        let value = env::var(name).context(format!("{} must be set", name))?;
        if value.trim().is_empty() {
            anyhow::bail!("{} must not be empty", name);
        }
        Ok(value)
    }

    /// Get an optional environment variable, treating empty values as unset.
    fn env_opt(name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    /// Get an environment variable parsed as a specific type.
    ///
    /// Returns `default` if the variable is not set or fails to parse.
    ///
    /// # Example
    /// ```ignore
    /// let port: u16 = u16::env_parse("PARAMETERS_SECRETS_EXTENSION_HTTP_PORT", 2773);
    /// ```
    fn env_parse<T: FromStr>(name: &str, default: T) -> T {
        env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

// Blanket implementation for all types
impl<T> ConfigExt for T {}

/// Function-runtime environment helpers.
///
/// The provisioner runs as a short-lived function invoked by a deployment hook;
/// these are the variables that runtime injects.
pub struct RuntimeEnv;

impl RuntimeEnv {
    /// Name of the deployed function, if running inside a function runtime.
    pub fn function_name() -> Option<String> {
        String::env_opt("AWS_LAMBDA_FUNCTION_NAME")
    }

    /// Session token used to authenticate against the local secrets extension.
    pub fn session_token() -> String {
        env::var("AWS_SESSION_TOKEN").unwrap_or_default()
    }

    /// Port of the local parameters/secrets extension.
    pub fn secrets_extension_port() -> u16 {
        u16::env_parse("PARAMETERS_SECRETS_EXTENSION_HTTP_PORT", 2773)
    }

    /// Webhook receiving provisioning telemetry, if configured.
    pub fn telemetry_endpoint() -> Option<String> {
        String::env_opt("TELEMETRY_ENDPOINT")
    }
}
