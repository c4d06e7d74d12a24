//! Secrets resolved through the local parameters/secrets extension

use super::{CredentialBundle, SecretStore};
use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use common::RuntimeEnv;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

const TOKEN_HEADER: &str = "X-Aws-Parameters-Secrets-Token";

#[derive(Deserialize)]
struct SecretValue {
    #[serde(rename = "SecretString")]
    secret_string: Option<String>,
}

/// Fetches secrets from the extension listening on localhost.
///
/// The extension authenticates callers with the runtime's session token and
/// answers with the secret manager's `GetSecretValue` document.
pub struct ExtensionSecretStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ExtensionSecretStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProvisionError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn from_env() -> Result<Self> {
        let token = RuntimeEnv::session_token();
        if token.is_empty() {
            return Err(ProvisionError::Config(
                "AWS_SESSION_TOKEN must be set to use the secrets extension".to_string(),
            ));
        }
        Self::new(
            format!("http://localhost:{}", RuntimeEnv::secrets_extension_port()),
            token,
        )
    }
}

#[async_trait]
impl SecretStore for ExtensionSecretStore {
    #[instrument(skip(self))]
    async fn fetch(&self, id: &str) -> Result<CredentialBundle> {
        let url = format!("{}/secretsmanager/get", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("secretId", id)])
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| ProvisionError::secret(id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::secret(
                id,
                format!("secrets extension answered {}", status),
            ));
        }

        let value: SecretValue = response
            .json()
            .await
            .map_err(|e| ProvisionError::secret(id, e))?;
        let raw = value
            .secret_string
            .ok_or_else(|| ProvisionError::secret(id, "secret has no string value"))?;

        debug!("Fetched secret");
        CredentialBundle::from_json(id, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer one request with a canned response; resolves to the raw request head.
    async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (base_url, handle)
    }

    fn secret_document(secret_string: Option<&str>) -> String {
        let document = match secret_string {
            Some(value) => serde_json::json!({ "Name": "geo/master", "SecretString": value }),
            None => serde_json::json!({ "Name": "geo/master", "SecretBinary": "AAEC" }),
        };
        document.to_string()
    }

    #[tokio::test]
    async fn test_fetch_sends_token_and_secret_id() {
        let bundle = r#"{"username":"postgres","password":"pw","host":"db.internal","port":5432}"#;
        let (base_url, server) = serve_once("200 OK", secret_document(Some(bundle))).await;
        let store = ExtensionSecretStore::new(base_url, "token-123").unwrap();

        let fetched = store.fetch("geo/master").await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("GET /secretsmanager/get?secretId=geo%2Fmaster "));
        assert!(request
            .to_ascii_lowercase()
            .contains("x-aws-parameters-secrets-token: token-123"));
        assert_eq!(fetched.username, "postgres");
        assert_eq!(fetched.password, "pw");
        assert_eq!(fetched.host.as_deref(), Some("db.internal"));
        assert_eq!(fetched.port, Some(5432));
    }

    #[tokio::test]
    async fn test_missing_secret_string_is_a_secret_error() {
        let (base_url, server) = serve_once("200 OK", secret_document(None)).await;
        let store = ExtensionSecretStore::new(base_url, "token").unwrap();

        let err = store.fetch("geo/master").await.unwrap_err();
        server.await.unwrap();

        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("no string value"));
    }

    #[tokio::test]
    async fn test_error_status_is_a_secret_error() {
        let body = r#"{"message":"secret not found"}"#.to_string();
        let (base_url, server) = serve_once("404 Not Found", body).await;
        let store = ExtensionSecretStore::new(base_url, "token").unwrap();

        let err = store.fetch("geo/missing").await.unwrap_err();
        server.await.unwrap();

        let message = err.to_string();
        assert!(message.contains("geo/missing"));
        assert!(message.contains("404"));
    }

    #[test]
    fn test_trims_trailing_slash() {
        let store = ExtensionSecretStore::new("http://localhost:2773/", "token").unwrap();
        assert_eq!(store.base_url, "http://localhost:2773");
    }

    #[tokio::test]
    async fn test_unreachable_extension_is_a_secret_error() {
        // Port 9 (discard) is closed on any sane test host.
        let store = ExtensionSecretStore::new("http://127.0.0.1:9", "token").unwrap();
        let err = store.fetch("geo/master").await.unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("geo/master"));
    }
}
