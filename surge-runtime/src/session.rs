//! Caller session
//!
//! A session holds at most one active batch. Starting a new batch cancels the
//! active one and replaces it. Batches are addressed through opaque
//! [`BatchHandle`]s that map to run records owned by the session.
//!
//! # Example
//!
//! ```rust,ignore
//! let session = Session::new(SessionConfig::default());
//! let handle = session.start_batch(BatchConfig::new(9, 3))?;
//!
//! let snapshot = session.observe(handle)?;
//! println!("in flight: {}", snapshot.current_concurrency);
//!
//! let outcome = session.await_completion(handle).await?;
//! ```

use crate::batch::{BatchConfig, BatchId, BatchOutcome, BatchSnapshot, TaskOutcome};
use crate::config::SessionConfig;
use crate::events::LogEvent;
use crate::runner::BatchRun;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Opaque reference to a batch started by a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchHandle {
    id: BatchId,
}

impl BatchHandle {
    pub fn id(&self) -> BatchId {
        self.id
    }
}

impl fmt::Display for BatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

#[derive(Default)]
struct Registry {
    runs: HashMap<BatchId, Arc<BatchRun>>,
    order: VecDeque<BatchId>,
    active: Option<BatchId>,
}

impl Registry {
    fn insert(&mut self, run: Arc<BatchRun>) {
        self.order.push_back(run.id());
        self.runs.insert(run.id(), run);
    }

    /// Drop the oldest terminal records beyond `retained`
    fn prune(&mut self, retained: usize) {
        let mut excess = self.order.len().saturating_sub(retained);
        let mut kept = VecDeque::with_capacity(self.order.len());

        while let Some(id) = self.order.pop_front() {
            let terminal = self
                .runs
                .get(&id)
                .map(|run| run.state().is_terminal())
                .unwrap_or(true);

            if excess > 0 && terminal && self.active != Some(id) {
                self.runs.remove(&id);
                excess -= 1;
            } else {
                kept.push_back(id);
            }
        }

        self.order = kept;
    }
}

/// Single-flight batch session
pub struct Session {
    config: SessionConfig,
    registry: Mutex<Registry>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Start a batch, canceling the active one.
    ///
    /// Returns immediately; tasks run on the current Tokio runtime. An
    /// invalid configuration fails here, before anything is launched or
    /// canceled.
    #[tracing::instrument(
        name = "session.start_batch",
        skip(self, config),
        fields(
            tasks = config.task_count,
            permits = config.permits,
            batch_id = tracing::field::Empty,
        )
    )]
    pub fn start_batch(&self, config: BatchConfig) -> Result<BatchHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("start_batch needs a Tokio runtime: {}", e)))?;

        let operation = config.resolve_operation();
        let run = Arc::new(BatchRun::new(config, self.config.event_capacity)?);
        let handle = BatchHandle { id: run.id() };
        tracing::Span::current().record("batch_id", tracing::field::display(handle.id));

        {
            let mut registry = self.registry.lock();

            let previous = registry
                .active
                .take()
                .and_then(|id| registry.runs.get(&id).cloned());
            if let Some(previous) = previous {
                tracing::info!(
                    previous = %previous.id(),
                    next = %handle.id,
                    "Superseding active batch"
                );
                previous.cancel();
            }

            registry.insert(run.clone());
            registry.active = Some(handle.id);
            registry.prune(self.config.retained_runs);
        }

        runtime.spawn(run.run(operation));
        Ok(handle)
    }

    /// Snapshot of a batch's counters and event log
    pub fn observe(&self, handle: BatchHandle) -> Result<BatchSnapshot> {
        Ok(self.batch(handle)?.snapshot())
    }

    /// Wait until the batch completes or is canceled
    pub async fn await_completion(&self, handle: BatchHandle) -> Result<BatchOutcome> {
        let run = self.batch(handle)?;
        run.wait().await
    }

    /// Live feed of events appended after this call
    pub fn subscribe(&self, handle: BatchHandle) -> Result<broadcast::Receiver<LogEvent>> {
        Ok(self.batch(handle)?.subscribe())
    }

    /// Per-task outcomes recorded so far
    pub fn outcomes(&self, handle: BatchHandle) -> Result<Vec<TaskOutcome>> {
        Ok(self.batch(handle)?.outcomes())
    }

    /// Run record behind a handle
    pub fn batch(&self, handle: BatchHandle) -> Result<Arc<BatchRun>> {
        self.registry
            .lock()
            .runs
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("batch {}", handle.id)))
    }

    /// Handle of the active batch, if any
    pub fn active(&self) -> Option<BatchHandle> {
        self.registry.lock().active.map(|id| BatchHandle { id })
    }

    /// Cancel the active batch and leave the session idle
    pub fn reset(&self) {
        let mut registry = self.registry.lock();
        if let Some(run) = registry
            .active
            .take()
            .and_then(|id| registry.runs.get(&id).cloned())
        {
            run.cancel();
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reset();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("runs", &registry.runs.len())
            .field("active", &registry.active)
            .finish()
    }
}
