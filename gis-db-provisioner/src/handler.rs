//! Invocation entry point and result envelope
//!
//! All errors stop here and become the generic failure response.

use crate::config::ProvisionConfig;
use crate::db::{Connector, PgConnector};
use crate::error::{ProvisionError, Result};
use crate::provision::{ProvisionReport, Provisioner};
use crate::secrets::{self, SecretStore};
use crate::ssl::validate_trust_root;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Structured result returned to the deployment trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub status: u16,
    pub message: String,
}

impl ProvisionResponse {
    pub fn from_result(result: &Result<ProvisionReport>) -> Self {
        match result {
            Ok(report) => Self {
                status: 200,
                message: format!(
                    "Database {} provisioned (schema {})",
                    report.database, report.schema
                ),
            },
            Err(e) => Self {
                status: 500,
                message: format!("Database provisioning failed ({}): {}", e.kind(), e),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Resolve credentials and run the provisioner within the time budget.
///
/// Secrets are resolved before any connection is opened; a lookup failure
/// returns without touching the database.
pub async fn provision(
    config: &ProvisionConfig,
    store: &dyn SecretStore,
    connector: &dyn Connector,
) -> Result<ProvisionReport> {
    config.validate()?;

    let budget = config.timeout;
    tokio::time::timeout(budget, async {
        let credentials = secrets::resolve_all(store, &config.secret_ids).await?;
        Provisioner::new(config, &credentials, connector).run().await
    })
    .await
    .map_err(|_| ProvisionError::Timeout(budget))?
}

/// Production wiring: environment configuration, the selected secret store,
/// a validated trust root and TLS connections.
pub async fn provision_from_env(config: &ProvisionConfig) -> Result<ProvisionReport> {
    let store = secrets::store_for(&config.secret_store)?;
    validate_trust_root(&config.ssl_root_cert).map_err(ProvisionError::TrustRoot)?;
    let connector = PgConnector::new(&config.ssl_root_cert);

    info!(
        database = %config.database,
        schema = %config.schema,
        store = ?config.secret_store,
        "Starting provisioning"
    );

    let result = provision(config, store.as_ref(), &connector).await;
    if let Err(e) = &result {
        error!(kind = e.kind(), error = %e, "Provisioning failed");
    }
    result
}
