//! Compare command

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use surge_runtime::{comparison, DelayedOperation, ResourceIdentity};

pub async fn execute(
    tasks: i64,
    permits: i64,
    latency_ms: u64,
    identity: ResourceIdentity,
    json: bool,
) -> Result<()> {
    tracing::info!(tasks, permits, latency_ms, "Comparing unbounded and gated execution");

    let latency = Duration::from_millis(latency_ms);
    let report = comparison::compare(
        Arc::new(DelayedOperation::new(latency)),
        tasks,
        permits,
        latency,
        identity,
    )
    .await
    .context("Comparison failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Comparison: {} tasks, {}ms per request\n",
            report.task_count,
            report.latency.as_millis()
        );
        println!("{}", report);
    }

    Ok(())
}
