//! Database provisioning entry point
//!
//! Invoked once per deployment by the release hook, without arguments.
//! Reads its parameters from the environment, provisions the database and
//! prints the result envelope as one JSON line on stdout.
//! Exits 0 on success and 1 on any failure.

use anyhow::anyhow;
use common::{init_logging, Telemetry, TelemetryEvent};
use gis_db_provisioner::{
    provision_from_env, ProvisionConfig, ProvisionError, ProvisionReport, ProvisionResponse,
};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, warn};

/// Run provisioning on a dedicated runtime.
///
/// The work runs in a spawned task so a panic surfaces as an unexpected error
/// instead of tearing down the process without a response.
fn run(config: &ProvisionConfig) -> Result<ProvisionReport, ProvisionError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ProvisionError::Unexpected(anyhow!("failed to start runtime: {}", e)))?;

    let config = config.clone();
    runtime
        .block_on(async move {
            tokio::spawn(async move { provision_from_env(&config).await }).await
        })
        .map_err(|e| ProvisionError::Unexpected(anyhow!("provisioning task aborted: {}", e)))?
}

fn main() -> ExitCode {
    let _guard = init_logging("provision-database");

    let start = Instant::now();
    // The blocking telemetry client must live outside the async runtime.
    let telemetry = Telemetry::from_env("gis-db-provisioner");

    let config = ProvisionConfig::from_env();
    let database = config
        .as_ref()
        .map(|c| c.database.clone())
        .unwrap_or_else(|_| "unknown".to_string());

    let result = config.and_then(|config| {
        telemetry.send(TelemetryEvent::ProvisionStarted {
            database: config.database.clone(),
            schema: config.schema.clone(),
        });
        run(&config)
    });

    let response = ProvisionResponse::from_result(&result);
    let event = match &result {
        Ok(report) => TelemetryEvent::ProvisionCompleted {
            database: database.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
            roles_created: report.roles_created.clone(),
            objects_reassigned: report.objects_reassigned,
        },
        Err(e) => TelemetryEvent::ProvisionFailed {
            database: database.clone(),
            error: e.to_string(),
            kind: e.kind().to_string(),
        },
    };
    if let Err(e) = telemetry.send_sync(event) {
        warn!("Telemetry send failed: {}", e);
    }

    match serde_json::to_string(&response) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("Failed to serialize response: {}", e),
    }

    info!(
        status = response.status,
        duration_ms = start.elapsed().as_millis() as u64,
        "Provisioner finished"
    );

    if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
