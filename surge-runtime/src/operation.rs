//! Slow operation contract
//!
//! The runner treats the unit of work as opaque: it hands over a resource id
//! and gets back a payload or an error after some latency.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Result payload returned by a successful invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub resource_id: u64,
    pub body: String,
}

/// Failure reported by a slow operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("resource {resource_id}: {reason}")]
pub struct OperationError {
    pub resource_id: u64,
    pub reason: String,
}

impl OperationError {
    pub fn new(resource_id: u64, reason: impl Into<String>) -> Self {
        Self {
            resource_id,
            reason: reason.into(),
        }
    }
}

/// Trait for the slow external resource a batch is dispatched against
#[async_trait]
pub trait SlowOperation: Send + Sync {
    /// Fetch one resource
    async fn invoke(&self, resource_id: u64) -> Result<Payload, OperationError>;
}

/// Operation that sleeps for a fixed latency and then answers.
///
/// Resources listed in `failing` are answered with an error after the same
/// latency.
#[derive(Debug, Clone, Default)]
pub struct DelayedOperation {
    latency: Duration,
    failing: HashSet<u64>,
}

impl DelayedOperation {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            failing: HashSet::new(),
        }
    }

    /// Fail every request for the given resource ids
    pub fn failing_on(mut self, resource_ids: impl IntoIterator<Item = u64>) -> Self {
        self.failing.extend(resource_ids);
        self
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }
}

#[async_trait]
impl SlowOperation for DelayedOperation {
    async fn invoke(&self, resource_id: u64) -> Result<Payload, OperationError> {
        tokio::time::sleep(self.latency).await;

        if self.failing.contains(&resource_id) {
            return Err(OperationError::new(resource_id, "resource unavailable"));
        }

        Ok(Payload {
            resource_id,
            body: format!("resource-{}", resource_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_delayed_operation_waits_for_latency() {
        let op = DelayedOperation::new(Duration::from_millis(1500));
        assert_eq!(op.latency(), Duration::from_millis(1500));
        let start = tokio::time::Instant::now();

        let payload = op.invoke(7).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert_eq!(payload.resource_id, 7);
        assert_eq!(payload.body, "resource-7");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_resources() {
        let op = DelayedOperation::new(Duration::from_millis(10)).failing_on([2]);

        assert!(op.invoke(1).await.is_ok());
        let err = op.invoke(2).await.unwrap_err();
        assert_eq!(err.resource_id, 2);
        assert_eq!(err.to_string(), "resource 2: resource unavailable");
    }
}
