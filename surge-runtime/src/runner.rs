//! Batch runner
//!
//! A [`BatchRun`] owns everything one batch touches: its admission gate,
//! concurrency tracker, event log, and counters. Nothing is shared between
//! batches, so a superseded batch can wind down without disturbing the one
//! that replaced it.
//!
//! ## Task lifecycle
//!
//! ```text
//! acquire gate ──▶ tracker.enter ──▶ Request event ──▶ invoke
//!                                                        │
//!        release gate ◀── tracker end ◀── Success/Error ◀┘
//! ```
//!
//! The gate permit and the tracker entry are RAII guards, so the cleanup
//! step runs on success, failure, cancellation, and panic alike.

use crate::batch::{
    BatchConfig, BatchId, BatchOutcome, BatchSnapshot, BatchSummary, TaskOutcome, TaskResult,
};
use crate::concurrency::AdmissionGate;
use crate::events::{EventLog, LogEvent, Severity};
use crate::metrics::{record_task, BATCHES_TOTAL};
use crate::operation::SlowOperation;
use crate::state_machine::{BatchState, StateMachine};
use crate::tracker::ConcurrencyTracker;
use crate::{Error, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const SEPARATOR: &str = "━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Default)]
struct Timing {
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

/// State of one batch run
pub struct BatchRun {
    id: BatchId,
    config: BatchConfig,
    total: usize,
    gate: AdmissionGate,
    tracker: ConcurrencyTracker,
    events: EventLog,
    completed: AtomicUsize,
    failed: AtomicUsize,
    outcomes: Mutex<Vec<TaskOutcome>>,
    state: Mutex<StateMachine>,
    timing: Mutex<Timing>,
    cancel: CancellationToken,
    outcome: watch::Sender<Option<BatchOutcome>>,
}

impl BatchRun {
    /// Validate `config` and create an idle run
    pub fn new(config: BatchConfig, event_capacity: usize) -> Result<Self> {
        config.validate()?;

        let id = BatchId::new();
        let gate = AdmissionGate::new(config.permits)?;
        let (outcome, _) = watch::channel(None);

        Ok(Self {
            id,
            total: config.tasks(),
            config,
            gate,
            tracker: ConcurrencyTracker::new(),
            events: EventLog::new(id, event_capacity),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            outcomes: Mutex::new(Vec::new()),
            state: Mutex::new(StateMachine::new()),
            timing: Mutex::new(Timing::default()),
            cancel: CancellationToken::new(),
            outcome,
        })
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn tracker(&self) -> &ConcurrencyTracker {
        &self.tracker
    }

    pub fn state(&self) -> BatchState {
        self.state.lock().current_state()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    /// Outcomes of the tasks that finished so far, in completion order
    pub fn outcomes(&self) -> Vec<TaskOutcome> {
        self.outcomes.lock().clone()
    }

    /// Signal cooperative cancellation.
    ///
    /// Waiting tasks stop waiting and in-flight tasks abandon their operation;
    /// all of them still release what they hold.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(batch_id = %self.id, "Canceling batch");
        }
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wall-clock time since launch, frozen once the batch completes
    pub fn elapsed(&self) -> Duration {
        let timing = self.timing.lock();
        match (timing.elapsed, timing.started) {
            (Some(elapsed), _) => elapsed,
            (None, Some(started)) => started.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    /// Consistent view of the run's counters and log
    pub fn snapshot(&self) -> BatchSnapshot {
        let (state, history) = {
            let machine = self.state.lock();
            (machine.current_state(), machine.history().to_vec())
        };

        BatchSnapshot {
            batch_id: self.id,
            state,
            current_concurrency: self.tracker.current(),
            max_concurrency: self.tracker.max(),
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            total: self.total,
            elapsed: self.elapsed(),
            history,
            events: self.events.snapshot(),
        }
    }

    /// Wait until the run reaches a terminal state
    pub async fn wait(&self) -> Result<BatchOutcome> {
        let mut rx = self.outcome.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|e| Error::Internal(format!("batch {} outcome lost: {}", self.id, e)))?;

        (*outcome)
            .clone()
            .ok_or_else(|| Error::Internal(format!("batch {} has no outcome", self.id)))
    }

    /// Launch every task, wait for all of them, and publish the outcome
    #[tracing::instrument(
        name = "runner.run",
        skip(self, operation),
        fields(
            batch_id = %self.id,
            tasks = self.total,
            permits = self.config.permits,
        )
    )]
    pub async fn run(self: Arc<Self>, operation: Arc<dyn SlowOperation>) -> BatchOutcome {
        if self.cancel.is_cancelled() {
            return self.finish_canceled();
        }

        self.transition(BatchState::Running);
        self.timing.lock().started = Some(Instant::now());
        self.announce();

        let mut tasks = JoinSet::new();
        for index in 0..self.total {
            tasks.spawn(self.clone().run_task(operation.clone(), index));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                // Guards already released the gate and tracker during unwinding.
                self.failed.fetch_add(1, Ordering::AcqRel);
                record_task("failed", 0.0);
                self.events
                    .append(Severity::Error, format!("a task aborted: {}", e));
            }
        }

        if self.cancel.is_cancelled() {
            return self.finish_canceled();
        }
        self.finish_completed()
    }

    async fn run_task(self: Arc<Self>, operation: Arc<dyn SlowOperation>, index: usize) {
        let number = index + 1;
        let resource_id = self.config.identity.resource_for(index);
        let queued = Instant::now();

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.record_canceled(number, "canceled while waiting for a permit");
                return;
            }
            permit = self.gate.acquire() => permit,
        };
        let permit = match permit {
            Ok(permit) => permit,
            Err(e) => {
                self.failed.fetch_add(1, Ordering::AcqRel);
                record_task("failed", 0.0);
                self.events
                    .append_task(number, Severity::Error, format!("[{}] failed: {}", number, e));
                return;
            }
        };
        let waited = queued.elapsed();

        let in_flight = self.tracker.enter();
        let depth = in_flight.depth();
        let started_at = Utc::now();
        let admitted = Instant::now();

        self.events.append_task(
            number,
            Severity::Request,
            format!(
                "[{}] request started for resource {} (concurrent: {})",
                number, resource_id, depth
            ),
        );

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = operation.invoke(resource_id) => Some(result),
        };
        let duration = admitted.elapsed().as_secs_f64();

        let result = match result {
            Some(Ok(payload)) => {
                self.completed.fetch_add(1, Ordering::AcqRel);
                record_task("succeeded", duration);
                self.events.append_task(
                    number,
                    Severity::Success,
                    format!("[{}] completed (resource {})", number, payload.resource_id),
                );
                TaskResult::Success { payload }
            }
            Some(Err(e)) => {
                self.failed.fetch_add(1, Ordering::AcqRel);
                record_task("failed", duration);
                self.events
                    .append_task(number, Severity::Error, format!("[{}] failed: {}", number, e));
                TaskResult::Failure {
                    reason: e.to_string(),
                }
            }
            None => {
                record_task("canceled", duration);
                self.record_canceled(number, "canceled while in flight");
                return;
            }
        };

        self.outcomes.lock().push(TaskOutcome {
            index,
            resource_id,
            started_at,
            completed_at: Utc::now(),
            waited,
            concurrency_at_start: depth,
            result,
        });

        drop(in_flight);
        drop(permit);
    }

    fn record_canceled(&self, number: usize, reason: &str) {
        self.events.append_task(
            number,
            Severity::Warning,
            format!("[{}] {}", number, reason),
        );
    }

    fn transition(&self, state: BatchState) {
        if let Err(e) = self.state.lock().transition(state) {
            tracing::warn!(batch_id = %self.id, error = %e, "Ignoring batch state transition");
        }
    }

    fn announce(&self) {
        if let Some(label) = &self.config.label {
            self.events.append(Severity::Info, label.clone());
        }

        if self.gate.is_bounded() {
            self.events.append(
                Severity::Info,
                format!(
                    "{} requests started (admission gate: {} permits)",
                    self.total,
                    self.gate.permits()
                ),
            );
            self.events.append(
                Severity::Info,
                format!(
                    "at most {} requests reach the backend at the same time",
                    self.gate.permits()
                ),
            );
        } else {
            self.events.append(
                Severity::Info,
                format!("{} requests started at once (no admission gate)", self.total),
            );
            self.events.append(
                Severity::Warning,
                "all requests go out to the backend at once",
            );
        }
    }

    fn freeze_elapsed(&self) -> Duration {
        let mut timing = self.timing.lock();
        let elapsed = timing
            .started
            .map(|started| started.elapsed())
            .unwrap_or_default();
        *timing.elapsed.get_or_insert(elapsed)
    }

    fn finish_completed(&self) -> BatchOutcome {
        let elapsed = self.freeze_elapsed();
        let summary = BatchSummary {
            batch_id: self.id,
            total_tasks: self.total,
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            max_concurrency: self.tracker.max(),
            permits: self.gate.permits(),
            elapsed,
        };

        self.emit_summary(&summary);
        self.transition(BatchState::Completed);
        BATCHES_TOTAL.with_label_values(&["completed"]).inc();

        tracing::info!(
            batch_id = %self.id,
            completed = summary.completed,
            failed = summary.failed,
            max_concurrency = summary.max_concurrency,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Batch completed"
        );

        let outcome = BatchOutcome::Completed(summary);
        self.outcome.send_replace(Some(outcome.clone()));
        outcome
    }

    fn finish_canceled(&self) -> BatchOutcome {
        self.freeze_elapsed();
        self.events
            .append(Severity::Warning, "batch canceled: superseded by a newer batch");
        self.transition(BatchState::Canceled);
        BATCHES_TOTAL.with_label_values(&["canceled"]).inc();

        let outcome = BatchOutcome::Canceled {
            batch_id: self.id,
            total_tasks: self.total,
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
        };
        self.outcome.send_replace(Some(outcome.clone()));
        outcome
    }

    fn emit_summary(&self, summary: &BatchSummary) {
        self.events.append(Severity::Info, SEPARATOR);
        self.events.append(
            Severity::Info,
            format!("total elapsed: {}ms", summary.elapsed.as_millis()),
        );
        self.events.append(
            Severity::Warning,
            format!("max concurrent requests: {}", summary.max_concurrency),
        );
        self.events.append(Severity::Info, "");

        if self.gate.is_bounded() {
            self.events.append(Severity::Success, "benefits:");
            self.events.append(
                Severity::Success,
                format!(
                    "- concurrency capped at {} (observed {})",
                    summary.permits, summary.max_concurrency
                ),
            );
            self.events
                .append(Severity::Success, "- backend load reduced");
            self.events
                .append(Severity::Success, "- requests processed at a steady pace");
            if summary.failed > 0 {
                self.events.append(
                    Severity::Warning,
                    format!("{} of {} requests failed", summary.failed, summary.total_tasks),
                );
            }
        } else {
            self.events.append(Severity::Error, "problems:");
            self.events.append(
                Severity::Error,
                format!("- {} requests hit the backend at once", summary.total_tasks),
            );
            for (resource_id, count) in self.repeated_resources() {
                self.events.append(
                    Severity::Error,
                    format!("- resource {} was fetched {} times", resource_id, count),
                );
            }
            if summary.failed > 0 {
                self.events.append(
                    Severity::Error,
                    format!("- {} of {} requests failed", summary.failed, summary.total_tasks),
                );
            }
            self.events.append(
                Severity::Success,
                "an admission gate would cap concurrency and keep the backend stable",
            );
        }
    }

    /// Resources requested by more than one task, ordered by id
    fn repeated_resources(&self) -> Vec<(u64, usize)> {
        let mut counts = BTreeMap::new();
        for index in 0..self.total {
            *counts
                .entry(self.config.identity.resource_for(index))
                .or_insert(0usize) += 1;
        }
        counts.into_iter().filter(|(_, count)| *count > 1).collect()
    }
}

impl std::fmt::Debug for BatchRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRun")
            .field("id", &self.id)
            .field("total", &self.total)
            .field("state", &self.state())
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ResourceIdentity;
    use crate::operation::DelayedOperation;

    fn launch(config: BatchConfig) -> (Arc<BatchRun>, tokio::task::JoinHandle<BatchOutcome>) {
        let operation = config.resolve_operation();
        let run = Arc::new(BatchRun::new(config, 64).unwrap());
        let handle = tokio::spawn(run.clone().run(operation));
        (run, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_run_completes() {
        let config = BatchConfig::new(5, 0).with_latency(Duration::from_millis(100));
        let (run, handle) = launch(config);

        let outcome = handle.await.unwrap();
        let summary = outcome.summary().unwrap();

        assert_eq!(summary.completed, 5);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.max_concurrency, 5);
        assert_eq!(summary.elapsed, Duration::from_millis(100));
        assert_eq!(run.state(), BatchState::Completed);
        assert_eq!(run.tracker().current(), 0);
        assert_eq!(run.outcomes().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_run_respects_permits() {
        let config = BatchConfig::new(9, 3).with_latency(Duration::from_millis(100));
        let (run, handle) = launch(config);

        let summary = handle.await.unwrap().summary().cloned().unwrap();

        assert_eq!(summary.max_concurrency, 3);
        assert_eq!(summary.elapsed, Duration::from_millis(300));
        assert_eq!(run.gate().acquisitions(), 9);
        assert_eq!(run.gate().releases(), 9);
        assert!(run
            .outcomes()
            .iter()
            .all(|outcome| outcome.concurrency_at_start <= 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_isolated() {
        let operation = Arc::new(DelayedOperation::new(Duration::from_millis(50)).failing_on([2]));
        let config = BatchConfig::new(6, 2)
            .with_identity(ResourceIdentity::RoundRobin { ids: 3 })
            .with_operation(operation);
        let (run, handle) = launch(config);

        let summary = handle.await.unwrap().summary().cloned().unwrap();

        // Tasks 1 and 4 map to resource 2
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.completed, 4);
        assert_eq!(run.tracker().ends(), 6);
        assert_eq!(run.gate().releases(), 6);

        let errors = run
            .events()
            .into_iter()
            .filter(|e| e.severity == Severity::Error && e.task.is_some())
            .count();
        assert_eq!(errors, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_in_flight() {
        let config = BatchConfig::new(4, 2).with_latency(Duration::from_secs(60));
        let (run, handle) = launch(config);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(run.tracker().current(), 2);

        run.cancel();
        let outcome = handle.await.unwrap();

        assert!(outcome.is_canceled());
        assert_eq!(run.state(), BatchState::Canceled);
        assert_eq!(run.tracker().current(), 0);
        assert_eq!(run.gate().releases(), run.gate().acquisitions());
        assert!(matches!(run.wait().await.unwrap(), BatchOutcome::Canceled { .. }));
    }

    #[tokio::test]
    async fn test_cancel_before_launch() {
        let config = BatchConfig::new(3, 0);
        let operation = config.resolve_operation();
        let run = Arc::new(BatchRun::new(config, 8).unwrap());

        run.cancel();
        let outcome = run.clone().run(operation).await;

        assert!(outcome.is_canceled());
        assert_eq!(run.tracker().starts(), 0);
        assert_eq!(run.state(), BatchState::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_block_for_unbounded_same_resource() {
        let config = BatchConfig::new(5, 0).with_latency(Duration::from_millis(10));
        let (run, handle) = launch(config);
        handle.await.unwrap();

        let messages: Vec<String> = run.events().into_iter().map(|e| e.message).collect();
        assert!(messages.contains(&"problems:".to_string()));
        assert!(messages.contains(&"- resource 1 was fetched 5 times".to_string()));
        assert!(messages.contains(&"max concurrent requests: 5".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_block_for_bounded_run() {
        let config = BatchConfig::new(4, 2).with_latency(Duration::from_millis(10));
        let (run, handle) = launch(config);
        handle.await.unwrap();

        let events = run.events();
        let last = events.last().unwrap();
        assert_eq!(last.severity, Severity::Success);
        assert!(events
            .iter()
            .any(|e| e.message == "- concurrency capped at 2 (observed 2)"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = BatchRun::new(BatchConfig::new(0, 1), 8).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }
}
