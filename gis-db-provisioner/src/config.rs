//! Provisioner configuration from environment variables

use crate::error::{ProvisionError, Result};
use common::ConfigExt;
use std::path::PathBuf;
use std::time::Duration;

/// PostgreSQL truncates identifiers beyond NAMEDATALEN - 1 bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Default location of the database server CA bundle inside the function package.
pub const DEFAULT_SSL_ROOT_CERT: &str = "/var/task/global-bundle.pem";

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Identifiers of the four credential bundles in the secret store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretIds {
    pub master: String,
    pub read: String,
    pub write: String,
    pub admin: String,
}

/// Which secret store backend resolves the bundles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretStoreKind {
    /// Local parameters/secrets extension over HTTP.
    Extension,
    /// Bundle JSON injected directly into environment variables.
    Env,
    /// Bundle files mounted into a directory.
    File(PathBuf),
}

/// Configuration for one provisioning run.
///
/// Built once by the caller and passed into the provisioner.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub database: String,
    pub schema: String,
    pub secret_ids: SecretIds,
    pub ssl_root_cert: PathBuf,
    /// Group role granted to the admin role when the server has one.
    pub admin_group_role: String,
    pub timeout: Duration,
    pub secret_store: SecretStoreKind,
}

impl ProvisionConfig {
    /// Build a configuration with defaults for everything but the required inputs.
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        secret_ids: SecretIds,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            secret_ids,
            ssl_root_cert: PathBuf::from(DEFAULT_SSL_ROOT_CERT),
            admin_group_role: "rds_superuser".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secret_store: SecretStoreKind::Extension,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let required = |name: &str| {
            String::env_required(name).map_err(|e| ProvisionError::Config(e.to_string()))
        };

        let secret_ids = SecretIds {
            master: required("MASTER_SECRET_ID")?,
            read: required("READ_SECRET_ID")?,
            write: required("WRITE_SECRET_ID")?,
            admin: required("ADMIN_SECRET_ID")?,
        };

        let secret_store = match String::env_or("SECRET_STORE", "extension")
            .to_ascii_lowercase()
            .as_str()
        {
            "extension" => SecretStoreKind::Extension,
            "env" => SecretStoreKind::Env,
            "file" => SecretStoreKind::File(PathBuf::from(String::env_or(
                "SECRETS_DIR",
                "/run/secrets",
            ))),
            other => {
                return Err(ProvisionError::Config(format!(
                    "SECRET_STORE must be one of extension, env, file (got '{}')",
                    other
                )))
            }
        };

        let config = Self {
            database: required("DB_NAME")?,
            schema: required("DB_SCHEMA")?,
            secret_ids,
            ssl_root_cert: PathBuf::from(String::env_or("DB_SSL_ROOT_CERT", DEFAULT_SSL_ROOT_CERT)),
            admin_group_role: String::env_or("ADMIN_GROUP_ROLE", "rds_superuser"),
            timeout: parse_timeout(String::env_opt("PROVISION_TIMEOUT_SECS").as_deref())?,
            secret_store,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the identifiers before anything touches the network.
    pub fn validate(&self) -> Result<()> {
        check_identifier("database name", &self.database)?;
        check_identifier("schema name", &self.schema)?;
        check_identifier("admin group role", &self.admin_group_role)?;

        if self.timeout.is_zero() {
            return Err(ProvisionError::Config(
                "time budget must be greater than zero".to_string(),
            ));
        }

        let ids = [
            &self.secret_ids.master,
            &self.secret_ids.read,
            &self.secret_ids.write,
            &self.secret_ids.admin,
        ];
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ProvisionError::Config(
                "all four secret identifiers are required".to_string(),
            ));
        }

        Ok(())
    }
}

/// Unset means the default; anything unparsable is rejected rather than ignored.
fn parse_timeout(raw: Option<&str>) -> Result<Duration> {
    let Some(raw) = raw else {
        return Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    };
    raw.trim()
        .parse()
        .map(Duration::from_secs)
        .map_err(|_| {
            ProvisionError::Config(format!(
                "PROVISION_TIMEOUT_SECS must be a whole number of seconds (got '{}')",
                raw
            ))
        })
}

pub(crate) fn check_identifier(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ProvisionError::Config(format!("{} must not be empty", what)));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ProvisionError::Config(format!(
            "{} '{}' exceeds {} bytes",
            what, value, MAX_IDENTIFIER_LEN
        )));
    }
    if value.contains('\0') {
        return Err(ProvisionError::Config(format!(
            "{} contains a NUL byte",
            what
        )));
    }
    Ok(())
}
