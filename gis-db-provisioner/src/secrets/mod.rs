//! Credential bundles and the stores that resolve them
//!
//! Bundles are fetched fresh on every invocation; nothing here caches.

mod env;
mod extension;
mod file;

pub use env::EnvSecretStore;
pub use extension::ExtensionSecretStore;
pub use file::FileSecretStore;

use crate::config::{SecretIds, SecretStoreKind};
use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::fmt;
use tracing::{debug, instrument};

pub const DEFAULT_PORT: u16 = 5432;

/// Connection parameters of one database account.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialBundle {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "port_number_or_string")]
    pub port: Option<u16>,
    #[serde(default, alias = "dbname")]
    pub database: Option<String>,
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

/// Host and port a connection goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl CredentialBundle {
    /// Parse a bundle from a JSON secret document.
    ///
    /// Parse errors report only where the document broke; serde messages
    /// quote offending values, which may be the password.
    pub fn from_json(id: &str, raw: &str) -> Result<Self> {
        let bundle: Self = serde_json::from_str(raw).map_err(|e| {
            ProvisionError::secret(
                id,
                format!(
                    "malformed bundle ({:?} error at line {} column {})",
                    e.classify(),
                    e.line(),
                    e.column()
                ),
            )
        })?;
        bundle.checked(id)
    }

    /// Parse a bundle from a YAML (or JSON) secret document.
    pub fn from_yaml(id: &str, raw: &str) -> Result<Self> {
        let bundle: Self = serde_yaml::from_str(raw).map_err(|e| {
            let reason = match e.location() {
                Some(at) => format!(
                    "malformed bundle at line {} column {}",
                    at.line(),
                    at.column()
                ),
                None => "malformed bundle".to_string(),
            };
            ProvisionError::secret(id, reason)
        })?;
        bundle.checked(id)
    }

    fn checked(self, id: &str) -> Result<Self> {
        if self.username.trim().is_empty() {
            return Err(ProvisionError::secret(id, "username is empty"));
        }
        if self.password.is_empty() {
            return Err(ProvisionError::secret(id, "password is empty"));
        }
        Ok(self)
    }

    /// Endpoint of this bundle, inheriting host and port from `fallback`.
    ///
    /// Generated role bundles usually carry only a username and password.
    pub fn endpoint_or(&self, fallback: &CredentialBundle) -> Option<Endpoint> {
        let host = self.host.clone().or_else(|| fallback.host.clone())?;
        let port = self.port.or(fallback.port).unwrap_or(DEFAULT_PORT);
        Some(Endpoint { host, port })
    }
}

fn port_number_or_string<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(port)) => Ok(Some(port)),
        Some(Port::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Port::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{}'", text))),
    }
}

/// The four bundles one run needs.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub master: CredentialBundle,
    pub read: CredentialBundle,
    pub write: CredentialBundle,
    pub admin: CredentialBundle,
}

impl ResolvedCredentials {
    /// Every role must be a distinct account, and none may be the master.
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("master", &self.master.username),
            ("read", &self.read.username),
            ("write", &self.write.username),
            ("admin", &self.admin.username),
        ];
        for (i, (left, a)) in names.iter().enumerate() {
            crate::config::check_identifier(&format!("{} username", left), a)?;
            for (right, b) in &names[i + 1..] {
                if a == b {
                    return Err(ProvisionError::Config(format!(
                        "{} and {} bundles share the username '{}'",
                        left, right, a
                    )));
                }
            }
        }
        if self.master.host.is_none() {
            return Err(ProvisionError::Config(
                "master bundle does not name a host".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read-only lookup of credential bundles by identifier.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn fetch(&self, id: &str) -> Result<CredentialBundle>;
}

/// Fetch all four bundles concurrently.
///
/// The first failure aborts the rest, before any database connection exists.
#[instrument(skip_all)]
pub async fn resolve_all(store: &dyn SecretStore, ids: &SecretIds) -> Result<ResolvedCredentials> {
    let (master, read, write, admin) = tokio::try_join!(
        store.fetch(&ids.master),
        store.fetch(&ids.read),
        store.fetch(&ids.write),
        store.fetch(&ids.admin),
    )?;

    let resolved = ResolvedCredentials {
        master,
        read,
        write,
        admin,
    };
    resolved.validate()?;

    debug!(
        master = %resolved.master.username,
        read = %resolved.read.username,
        write = %resolved.write.username,
        admin = %resolved.admin.username,
        "Resolved credential bundles"
    );
    Ok(resolved)
}

/// Build the store selected by configuration.
pub fn store_for(kind: &SecretStoreKind) -> Result<Box<dyn SecretStore>> {
    let store: Box<dyn SecretStore> = match kind {
        SecretStoreKind::Extension => Box::new(ExtensionSecretStore::from_env()?),
        SecretStoreKind::Env => Box::new(EnvSecretStore),
        SecretStoreKind::File(dir) => Box::new(FileSecretStore::new(dir.clone())),
    };
    Ok(store)
}
