//! Batch data model: configuration, per-task outcomes, and summaries

use crate::events::LogEvent;
use crate::operation::{DelayedOperation, Payload, SlowOperation};
use crate::state_machine::BatchState;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Latency of the default slow operation
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(1500);

/// Unique identifier for a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Maps a task index to the logical resource it requests
#[derive(Clone)]
pub enum ResourceIdentity {
    /// Every task requests the same resource
    Fixed(u64),

    /// Task number `n` (1-based) requests `n % ids + 1`
    RoundRobin { ids: u64 },

    /// Caller-provided mapping from task index
    Custom(Arc<dyn Fn(usize) -> u64 + Send + Sync>),
}

impl ResourceIdentity {
    /// Resource id for the task at `index` (0-based)
    pub fn resource_for(&self, index: usize) -> u64 {
        match self {
            ResourceIdentity::Fixed(id) => *id,
            ResourceIdentity::RoundRobin { ids } => (index as u64 + 1) % (*ids).max(1) + 1,
            ResourceIdentity::Custom(map) => map(index),
        }
    }

    fn validate(&self) -> Result<()> {
        if let ResourceIdentity::RoundRobin { ids: 0 } = self {
            return Err(Error::InvalidConfiguration(
                "round-robin identity needs at least one resource id".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ResourceIdentity {
    fn default() -> Self {
        ResourceIdentity::Fixed(1)
    }
}

impl fmt::Debug for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceIdentity::Fixed(id) => f.debug_tuple("Fixed").field(id).finish(),
            ResourceIdentity::RoundRobin { ids } => {
                f.debug_struct("RoundRobin").field("ids", ids).finish()
            }
            ResourceIdentity::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Configuration of one batch run
#[derive(Clone)]
pub struct BatchConfig {
    /// Number of tasks to launch; must be positive
    pub task_count: i64,

    /// Admission gate permits; `0` means unlimited
    pub permits: i64,

    /// Latency of the default operation
    pub latency: Duration,

    /// Which resource each task requests
    pub identity: ResourceIdentity,

    /// Human-readable name used in the opening log line
    pub label: Option<String>,

    /// Operation to dispatch against; a `DelayedOperation` with `latency`
    /// when unset
    pub operation: Option<Arc<dyn SlowOperation>>,
}

impl BatchConfig {
    pub fn new(task_count: i64, permits: i64) -> Self {
        Self {
            task_count,
            permits,
            latency: DEFAULT_LATENCY,
            identity: ResourceIdentity::default(),
            label: None,
            operation: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_identity(mut self, identity: ResourceIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_operation(mut self, operation: Arc<dyn SlowOperation>) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Check the configuration before any task is launched
    pub fn validate(&self) -> Result<()> {
        if self.task_count <= 0 {
            return Err(Error::InvalidConfiguration(format!(
                "task_count must be positive, got {}",
                self.task_count
            )));
        }
        if usize::try_from(self.task_count).is_err() {
            return Err(Error::InvalidConfiguration(format!(
                "task_count {} exceeds platform limits",
                self.task_count
            )));
        }
        if self.permits < 0 {
            return Err(Error::InvalidConfiguration(format!(
                "permits must be non-negative, got {}",
                self.permits
            )));
        }
        self.identity.validate()
    }

    /// Task count as a size; call after `validate`
    pub fn tasks(&self) -> usize {
        usize::try_from(self.task_count).unwrap_or(0)
    }

    /// Whether an admission gate bounds this batch
    pub fn is_bounded(&self) -> bool {
        self.permits > 0
    }

    /// Operation the batch dispatches against
    pub fn resolve_operation(&self) -> Arc<dyn SlowOperation> {
        match &self.operation {
            Some(operation) => operation.clone(),
            None => Arc::new(DelayedOperation::new(self.latency)),
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("task_count", &self.task_count)
            .field("permits", &self.permits)
            .field("latency", &self.latency)
            .field("identity", &self.identity)
            .field("label", &self.label)
            .field("operation", &self.operation.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Result of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskResult {
    Success { payload: Payload },
    Failure { reason: String },
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success { .. })
    }
}

/// Record of a finished task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Task index (0-based)
    pub index: usize,
    pub resource_id: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Time spent waiting at the admission gate
    pub waited: Duration,
    /// Concurrency depth including this task when it started
    pub concurrency_at_start: usize,
    pub result: TaskResult,
}

/// Aggregate result of a completed batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub max_concurrency: usize,
    /// Gate permits, `0` for unlimited
    pub permits: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    /// Whether every task completed successfully
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.completed == self.total_tasks
    }
}

/// Terminal outcome of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum BatchOutcome {
    Completed(BatchSummary),

    /// Superseded by a newer batch; counts are those reached before
    /// cancellation and are not a summary
    Canceled {
        batch_id: BatchId,
        total_tasks: usize,
        completed: usize,
        failed: usize,
    },
}

impl BatchOutcome {
    pub fn summary(&self) -> Option<&BatchSummary> {
        match self {
            BatchOutcome::Completed(summary) => Some(summary),
            BatchOutcome::Canceled { .. } => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, BatchOutcome::Canceled { .. })
    }

    pub fn batch_id(&self) -> BatchId {
        match self {
            BatchOutcome::Completed(summary) => summary.batch_id,
            BatchOutcome::Canceled { batch_id, .. } => *batch_id,
        }
    }
}

/// Point-in-time view of a batch for polling callers
#[derive(Debug, Clone, Serialize)]
pub struct BatchSnapshot {
    pub batch_id: BatchId,
    pub state: BatchState,
    pub current_concurrency: usize,
    pub max_concurrency: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    pub elapsed: Duration,
    /// State transitions so far, starting with `Idle`
    pub history: Vec<(BatchState, DateTime<Utc>)>,
    pub events: Vec<LogEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BatchConfig::new(5, 0);
        assert_eq!(config.latency, DEFAULT_LATENCY);
        assert!(!config.is_bounded());
        assert_eq!(config.identity.resource_for(3), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_task_count() {
        for count in [0, -3] {
            let err = BatchConfig::new(count, 3).validate().unwrap_err();
            assert!(matches!(err, Error::InvalidConfiguration(_)));
            assert!(err.to_string().contains("task_count"));
        }
    }

    #[test]
    fn test_negative_permits() {
        let err = BatchConfig::new(5, -1).validate().unwrap_err();
        assert!(err.to_string().contains("permits"));
    }

    #[test]
    fn test_round_robin_identity() {
        let identity = ResourceIdentity::RoundRobin { ids: 3 };
        let ids: Vec<u64> = (0..6).map(|i| identity.resource_for(i)).collect();
        assert_eq!(ids, vec![2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn test_round_robin_needs_ids() {
        let config = BatchConfig::new(5, 0).with_identity(ResourceIdentity::RoundRobin { ids: 0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_identity() {
        let identity = ResourceIdentity::Custom(Arc::new(|index| index as u64 * 10));
        assert_eq!(identity.resource_for(4), 40);
        assert_eq!(format!("{:?}", identity), "Custom(..)");
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = BatchOutcome::Canceled {
            batch_id: BatchId::new(),
            total_tasks: 4,
            completed: 1,
            failed: 0,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "canceled");
        assert_eq!(json["total_tasks"], 4);
        assert!(outcome.summary().is_none());
    }
}
