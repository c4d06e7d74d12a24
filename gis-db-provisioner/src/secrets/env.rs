//! Secrets injected as environment variables

use super::{CredentialBundle, SecretStore};
use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::env;

/// Treats each identifier as the name of a variable holding the bundle JSON.
///
/// Container runtimes can inject secret manager values this way at start-up.
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn fetch(&self, id: &str) -> Result<CredentialBundle> {
        let raw = env::var(id).map_err(|e| ProvisionError::secret(id, e))?;
        CredentialBundle::from_json(id, &raw)
    }
}
