//! Ordered, append-only event log for a batch
//!
//! Tasks append concurrently; a single lock serializes appends so every
//! reader sees one total order. Each append is mirrored to `tracing` and
//! pushed to live subscribers.

use crate::batch::BatchId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
    Request,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Success => "success",
            Severity::Request => "request",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Position in the log, starting at 0
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Task number (1-based) for task lifecycle events
    pub task: Option<usize>,
    pub message: String,
}

/// Append-only event sequence shared by all tasks of one batch
#[derive(Debug)]
pub struct EventLog {
    batch_id: BatchId,
    events: Mutex<Vec<LogEvent>>,
    subscribers: broadcast::Sender<LogEvent>,
}

impl EventLog {
    /// Create an empty log; `capacity` bounds how far a live subscriber may lag
    pub fn new(batch_id: BatchId, capacity: usize) -> Self {
        let (subscribers, _) = broadcast::channel(capacity.max(1));
        Self {
            batch_id,
            events: Mutex::new(Vec::new()),
            subscribers,
        }
    }

    /// Append a batch-level event
    pub fn append(&self, severity: Severity, message: impl Into<String>) {
        self.push(severity, None, message.into());
    }

    /// Append an event about task number `task`
    pub fn append_task(&self, task: usize, severity: Severity, message: impl Into<String>) {
        self.push(severity, Some(task), message.into());
    }

    fn push(&self, severity: Severity, task: Option<usize>, message: String) {
        let mut events = self.events.lock();

        let event = LogEvent {
            sequence: events.len() as u64,
            timestamp: Utc::now(),
            severity,
            task,
            message,
        };
        self.trace(&event);

        // Broadcast under the lock so subscribers observe log order.
        let _ = self.subscribers.send(event.clone());
        events.push(event);
    }

    fn trace(&self, event: &LogEvent) {
        let batch_id = self.batch_id;
        match event.severity {
            Severity::Error => tracing::error!(
                batch_id = %batch_id,
                severity = %event.severity,
                task = ?event.task,
                "{}",
                event.message
            ),
            Severity::Warning => tracing::warn!(
                batch_id = %batch_id,
                severity = %event.severity,
                task = ?event.task,
                "{}",
                event.message
            ),
            Severity::Info | Severity::Success => tracing::info!(
                batch_id = %batch_id,
                severity = %event.severity,
                task = ?event.task,
                "{}",
                event.message
            ),
            Severity::Request => tracing::debug!(
                batch_id = %batch_id,
                severity = %event.severity,
                task = ?event.task,
                "{}",
                event.message
            ),
        }
    }

    /// Copy of every event appended so far
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Receive events appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.subscribers.subscribe()
    }
}
