//! Custom assertions for common verification patterns
//!
//! Provides chained assertion helpers over batch summaries and event logs
//! that give better error messages than bare `assert_eq!`.

use std::time::Duration;
use surge_runtime::{BatchSummary, LogEvent, Severity};

/// Summary assertion helpers
pub struct SummaryAssertions<'a> {
    summary: &'a BatchSummary,
}

impl<'a> SummaryAssertions<'a> {
    /// Create assertions for a summary
    pub fn new(summary: &'a BatchSummary) -> Self {
        Self { summary }
    }

    /// Assert every task ended as completed or failed
    pub fn assert_conserved(self) -> Self {
        assert_eq!(
            self.summary.completed + self.summary.failed,
            self.summary.total_tasks,
            "Expected completed ({}) + failed ({}) to equal total ({})",
            self.summary.completed,
            self.summary.failed,
            self.summary.total_tasks
        );
        self
    }

    /// Assert the number of completed tasks
    pub fn assert_completed(self, expected: usize) -> Self {
        assert_eq!(
            self.summary.completed, expected,
            "Expected {} completed tasks but got {}",
            expected, self.summary.completed
        );
        self
    }

    /// Assert the number of failed tasks
    pub fn assert_failed(self, expected: usize) -> Self {
        assert_eq!(
            self.summary.failed, expected,
            "Expected {} failed tasks but got {}",
            expected, self.summary.failed
        );
        self
    }

    /// Assert the observed peak concurrency
    pub fn assert_max_concurrency(self, expected: usize) -> Self {
        assert_eq!(
            self.summary.max_concurrency, expected,
            "Expected max concurrency {} but got {}",
            expected, self.summary.max_concurrency
        );
        self
    }

    /// Assert peak concurrency stayed within a bound
    pub fn assert_max_concurrency_at_most(self, bound: usize) -> Self {
        assert!(
            self.summary.max_concurrency <= bound,
            "Expected max concurrency at most {} but got {}",
            bound,
            self.summary.max_concurrency
        );
        self
    }

    /// Assert elapsed time equals `expected` exactly (paused clock)
    pub fn assert_elapsed(self, expected: Duration) -> Self {
        assert_eq!(
            self.summary.elapsed, expected,
            "Expected elapsed {:?} but got {:?}",
            expected, self.summary.elapsed
        );
        self
    }

    /// Assert elapsed time lies within `[low, high]`
    pub fn assert_elapsed_between(self, low: Duration, high: Duration) -> Self {
        assert!(
            self.summary.elapsed >= low && self.summary.elapsed <= high,
            "Expected elapsed between {:?} and {:?} but got {:?}",
            low,
            high,
            self.summary.elapsed
        );
        self
    }
}

/// Event log assertion helpers
pub struct EventAssertions<'a> {
    events: &'a [LogEvent],
}

impl<'a> EventAssertions<'a> {
    /// Create assertions for an event log
    pub fn new(events: &'a [LogEvent]) -> Self {
        Self { events }
    }

    /// Assert sequence numbers run 0, 1, 2, ... without gaps
    pub fn assert_sequential(self) -> Self {
        for (position, event) in self.events.iter().enumerate() {
            assert_eq!(
                event.sequence, position as u64,
                "Expected event at position {} to have sequence {} but got {}",
                position, position, event.sequence
            );
        }
        self
    }

    /// Assert some event message contains `needle`
    pub fn assert_contains(self, needle: &str) -> Self {
        assert!(
            self.events.iter().any(|event| event.message.contains(needle)),
            "Expected an event containing '{}'",
            needle
        );
        self
    }

    /// Assert no event message contains `needle`
    pub fn assert_not_contains(self, needle: &str) -> Self {
        let found = self.events.iter().find(|event| event.message.contains(needle));
        assert!(
            found.is_none(),
            "Expected no event containing '{}' but found '{}'",
            needle,
            found.map(|event| event.message.as_str()).unwrap_or_default()
        );
        self
    }

    /// Assert the number of events with a severity
    pub fn assert_severity_count(self, severity: Severity, expected: usize) -> Self {
        let count = self
            .events
            .iter()
            .filter(|event| event.severity == severity)
            .count();
        assert_eq!(
            count, expected,
            "Expected {} {} events but got {}",
            expected, severity, count
        );
        self
    }

    /// Assert each task's events open with its request and end at most once
    pub fn assert_task_lifecycles(self, tasks: usize) -> Self {
        for task in 1..=tasks {
            let lifecycle: Vec<&LogEvent> = self
                .events
                .iter()
                .filter(|event| event.task == Some(task))
                .collect();

            let Some(first) = lifecycle.first() else {
                continue;
            };
            if first.severity == Severity::Warning {
                // Canceled before admission
                assert_eq!(lifecycle.len(), 1, "Task {} logged after cancellation", task);
                continue;
            }

            assert_eq!(
                first.severity,
                Severity::Request,
                "Expected task {} to start with a request event",
                task
            );
            assert!(
                lifecycle.len() <= 2,
                "Expected at most two events for task {} but got {}",
                task,
                lifecycle.len()
            );

            if let Some(last) = lifecycle.get(1) {
                assert!(
                    matches!(
                        last.severity,
                        Severity::Success | Severity::Error | Severity::Warning
                    ),
                    "Expected task {} to end with success, error or cancellation, got {}",
                    task,
                    last.severity
                );
                assert!(
                    last.sequence > first.sequence,
                    "Expected task {} to end (sequence {}) after its request (sequence {})",
                    task,
                    last.sequence,
                    first.sequence
                );
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(sequence: u64, severity: Severity, task: usize) -> LogEvent {
        LogEvent {
            sequence,
            timestamp: Utc::now(),
            severity,
            task: Some(task),
            message: format!("[{}] {}", task, severity),
        }
    }

    #[test]
    fn test_task_lifecycles_accept_request_then_end() {
        let events = vec![
            event(0, Severity::Request, 1),
            event(1, Severity::Request, 2),
            event(2, Severity::Error, 2),
            event(3, Severity::Success, 1),
            event(4, Severity::Warning, 3),
        ];
        EventAssertions::new(&events).assert_task_lifecycles(3);
    }

    #[test]
    #[should_panic(expected = "to end with success, error or cancellation")]
    fn test_task_lifecycles_reject_second_request() {
        let events = vec![event(0, Severity::Request, 1), event(1, Severity::Request, 1)];
        EventAssertions::new(&events).assert_task_lifecycles(1);
    }

    #[test]
    #[should_panic(expected = "after its request")]
    fn test_task_lifecycles_reject_end_before_request() {
        let events = vec![event(1, Severity::Request, 1), event(0, Severity::Success, 1)];
        EventAssertions::new(&events).assert_task_lifecycles(1);
    }

    #[test]
    #[should_panic(expected = "to start with a request event")]
    fn test_task_lifecycles_reject_missing_request() {
        let events = vec![event(0, Severity::Success, 1)];
        EventAssertions::new(&events).assert_task_lifecycles(1);
    }
}
