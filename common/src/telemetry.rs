//! Telemetry for reporting provisioning events
//!
//! Every event is logged locally. When `TELEMETRY_ENDPOINT` is set, events are
//! also posted there as JSON so the deployment pipeline can alert on failures.

use crate::config::RuntimeEnv;
use chrono::Utc;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// All telemetry events emitted by the provisioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TelemetryEvent {
    /// Provisioning run started
    ProvisionStarted { database: String, schema: String },

    /// Provisioning finished successfully
    ProvisionCompleted {
        database: String,
        duration_ms: u64,
        roles_created: Vec<String>,
        objects_reassigned: usize,
    },

    /// Provisioning aborted
    ProvisionFailed {
        database: String,
        error: String,
        kind: String,
    },
}

impl TelemetryEvent {
    /// Get the event type name for logging and the webhook payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ProvisionStarted { .. } => "GIS_DB_PROVISION_STARTED",
            Self::ProvisionCompleted { .. } => "GIS_DB_PROVISION_COMPLETED",
            Self::ProvisionFailed { .. } => "GIS_DB_PROVISION_FAILED",
        }
    }

    /// Convert event to a human-readable message.
    pub fn message(&self) -> String {
        match self {
            Self::ProvisionStarted { database, schema } => {
                format!("Provisioning {} (schema {})", database, schema)
            }
            Self::ProvisionCompleted {
                database,
                duration_ms,
                roles_created,
                ..
            } => {
                if roles_created.is_empty() {
                    format!("Provisioned {} in {}ms", database, duration_ms)
                } else {
                    format!(
                        "Provisioned {} in {}ms (created roles: {})",
                        database,
                        duration_ms,
                        roles_created.join(", ")
                    )
                }
            }
            Self::ProvisionFailed {
                database,
                error,
                kind,
            } => {
                format!("Provisioning {} failed ({}): {}", database, kind, error)
            }
        }
    }

    fn is_failure(&self) -> bool {
        matches!(self, Self::ProvisionFailed { .. })
    }
}

/// Telemetry client for provisioning events.
#[derive(Clone)]
pub struct Telemetry {
    client: Arc<Client>,
    endpoint: Option<String>,
    component: String,
    invocation_id: Uuid,
}

impl Telemetry {
    /// Create a new telemetry client from environment variables.
    ///
    /// Must be called outside of an async runtime: the blocking client owns its
    /// own runtime thread.
    pub fn from_env(component: &str) -> Self {
        Self::new(component, RuntimeEnv::telemetry_endpoint())
    }

    /// Create a telemetry client with an explicit endpoint.
    pub fn new(component: &str, endpoint: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client: Arc::new(client),
            endpoint,
            component: component.to_string(),
            invocation_id: Uuid::new_v4(),
        }
    }

    /// Identifier shared by every event of this invocation.
    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    fn payload(&self, event: &TelemetryEvent) -> serde_json::Value {
        json!({
            "event": event.event_type(),
            "message": event.message(),
            "component": self.component,
            "invocation_id": self.invocation_id.to_string(),
            "function": RuntimeEnv::function_name(),
            "timestamp": Utc::now().to_rfc3339(),
            "data": event,
        })
    }

    fn log(&self, event: &TelemetryEvent) {
        let event_type = event.event_type();
        let message = event.message();
        if event.is_failure() {
            error!(event = %event_type, invocation = %self.invocation_id, "{}", message);
        } else {
            info!(event = %event_type, invocation = %self.invocation_id, "{}", message);
        }
    }

    /// Send a telemetry event (fire and forget, non-blocking).
    ///
    /// This spawns a thread to post the event. Errors are logged but do not
    /// affect the caller.
    pub fn send(&self, event: TelemetryEvent) {
        self.log(&event);

        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        let client = Arc::clone(&self.client);
        let payload = self.payload(&event);

        thread::spawn(move || match client.post(&endpoint).json(&payload).send() {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                warn!("Telemetry got status {}", resp.status());
            }
            Err(e) => {
                warn!("Telemetry send failed: {}", e);
            }
        });
    }

    /// Send a telemetry event synchronously (blocking).
    ///
    /// Use this for the final event of a process, which would otherwise be lost
    /// when the process exits. Must not be called from inside an async runtime.
    pub fn send_sync(&self, event: TelemetryEvent) -> Result<(), reqwest::Error> {
        self.log(&event);

        let Some(endpoint) = self.endpoint.as_deref() else {
            return Ok(());
        };

        self.client
            .post(endpoint)
            .json(&self.payload(&event))
            .send()?
            .error_for_status()?;

        Ok(())
    }
}
