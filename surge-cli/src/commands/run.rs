//! Run command

use super::OutputOptions;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use surge_runtime::{
    BatchConfig, BatchOutcome, DelayedOperation, ResourceIdentity, Session, SessionConfig,
};

/// Parameters of an ad hoc batch
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub tasks: i64,
    pub permits: i64,
    pub latency_ms: u64,
    pub identity: ResourceIdentity,
    pub fail_resources: Vec<u64>,
}

impl RunRequest {
    fn into_config(self) -> BatchConfig {
        let latency = Duration::from_millis(self.latency_ms);
        let config = BatchConfig::new(self.tasks, self.permits)
            .with_latency(latency)
            .with_identity(self.identity);

        if self.fail_resources.is_empty() {
            config
        } else {
            let operation = DelayedOperation::new(latency).failing_on(self.fail_resources);
            config.with_operation(Arc::new(operation))
        }
    }
}

pub async fn execute(request: RunRequest, output: &OutputOptions) -> Result<BatchOutcome> {
    tracing::info!(
        tasks = request.tasks,
        permits = request.permits,
        latency_ms = request.latency_ms,
        "Running batch"
    );

    let session = Session::new(SessionConfig::from_env().context("Invalid session configuration")?);
    let handle = session
        .start_batch(request.into_config())
        .context("Failed to start batch")?;

    super::drive(&session, handle, output).await
}
