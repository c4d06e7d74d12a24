//! Secrets mounted as files

use super::{CredentialBundle, SecretStore};
use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Reads `<dir>/<id>` and parses it as YAML or JSON.
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let relative = Path::new(id);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if id.is_empty() || !plain {
            return Err(ProvisionError::secret(
                id,
                "identifier must be a relative path inside the secrets directory",
            ));
        }
        Ok(self.dir.join(relative))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn fetch(&self, id: &str) -> Result<CredentialBundle> {
        let path = self.path_for(id)?;
        debug!(path = %path.display(), "Reading secret file");
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ProvisionError::secret(id, format!("{}: {}", path.display(), e)))?;
        CredentialBundle::from_yaml(id, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "gis-provisioner-{}-{}",
            name,
            std::process::id()
        ));
        fs::create_dir_all(dir.join("geo")).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_reads_yaml_bundle() {
        let dir = scratch_dir("yaml");
        fs::write(
            dir.join("geo/read"),
            "username: read\npassword: \"p@ss\"\nport: 5432\n",
        )
        .unwrap();

        let bundle = FileSecretStore::new(&dir).fetch("geo/read").await.unwrap();
        assert_eq!(bundle.username, "read");
        assert_eq!(bundle.password, "p@ss");
        assert_eq!(bundle.port, Some(5432));

        fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_reads_json_bundle() {
        let dir = scratch_dir("json");
        fs::write(
            dir.join("geo/master"),
            r#"{"username":"postgres","password":"pw","host":"db","port":"5432","dbname":"postgres"}"#,
        )
        .unwrap();

        let bundle = FileSecretStore::new(&dir).fetch("geo/master").await.unwrap();
        assert_eq!(bundle.host.as_deref(), Some("db"));
        assert_eq!(bundle.database.as_deref(), Some("postgres"));

        fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_rejects_escaping_identifier() {
        let store = FileSecretStore::new("/run/secrets");
        assert!(store.fetch("../etc/passwd").await.is_err());
        assert!(store.fetch("/etc/passwd").await.is_err());
    }
}
