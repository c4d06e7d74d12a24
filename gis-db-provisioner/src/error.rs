//! Provisioning error taxonomy

use std::time::Duration;
use thiserror::Error;

/// Everything that can abort a provisioning run.
///
/// No variant carries a password: connection errors name the user and
/// database, statement errors name the step.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("secret '{id}' could not be resolved: {reason}")]
    Secret { id: String, reason: String },

    #[error("trust root is unusable: {0:#}")]
    TrustRoot(anyhow::Error),

    #[error("failed to connect to database '{database}' as '{user}': {source}")]
    Connect {
        user: String,
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{step} failed: {source}")]
    Statement {
        step: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("provisioning did not finish within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ProvisionError {
    pub(crate) fn secret(id: &str, reason: impl ToString) -> Self {
        Self::Secret {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Coarse category used in logs and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::Secret { .. } | Self::TrustRoot(_) => "configuration",
            Self::Connect { .. } => "connectivity",
            Self::Statement { .. } => "statement",
            Self::Timeout(_) => "timeout",
            Self::Unexpected(_) => "unexpected",
        }
    }
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
