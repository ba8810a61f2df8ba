//! Scenario command

use super::OutputOptions;
use anyhow::{Context, Result};
use std::time::Duration;
use surge_runtime::{BatchOutcome, Scenario, Session, SessionConfig};

pub async fn execute(
    scenario: Scenario,
    permits: i64,
    latency_ms: Option<u64>,
    output: &OutputOptions,
) -> Result<BatchOutcome> {
    tracing::info!(%scenario, permits, "Running scenario");

    let mut config = scenario.config(permits);
    if let Some(latency_ms) = latency_ms {
        config = config.with_latency(Duration::from_millis(latency_ms));
    }

    let session = Session::new(SessionConfig::from_env().context("Invalid session configuration")?);
    let handle = session
        .start_batch(config)
        .with_context(|| format!("Failed to start scenario {}", scenario))?;

    super::drive(&session, handle, output).await
}
