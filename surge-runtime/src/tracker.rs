//! Concurrency depth tracking
//!
//! Lock-free counters for the number of tasks currently doing work and the
//! deepest concurrency seen since the tracker was created.

use crate::metrics::TASKS_IN_FLIGHT;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Tracks current and maximum in-flight task counts.
///
/// Each batch owns a fresh tracker, so a new tracker is the reset.
#[derive(Debug, Default)]
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    max: AtomicUsize,
    starts: AtomicUsize,
    ends: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task entering its working state.
    ///
    /// Returns the concurrency depth including this task.
    pub fn on_start(&self) -> usize {
        let depth = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        self.max.fetch_max(depth, Ordering::AcqRel);
        self.starts.fetch_add(1, Ordering::AcqRel);
        TASKS_IN_FLIGHT.inc();
        depth
    }

    /// Record a task leaving its working state
    pub fn on_end(&self) {
        // Saturate at zero; an unmatched end must not wrap the counter.
        let decremented = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1))
            .is_ok();

        if decremented {
            self.ends.fetch_add(1, Ordering::AcqRel);
            TASKS_IN_FLIGHT.dec();
        } else {
            tracing::warn!("concurrency tracker end without matching start");
        }
    }

    /// Start tracking a task; the guard ends it when dropped
    pub fn enter(&self) -> InFlight<'_> {
        let depth = self.on_start();
        InFlight {
            tracker: self,
            depth,
        }
    }

    /// Tasks currently in flight
    pub fn current(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// Highest in-flight count observed
    pub fn max(&self) -> usize {
        self.max.load(Ordering::Acquire)
    }

    /// Total `on_start` calls
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::Acquire)
    }

    /// Total matched `on_end` calls
    pub fn ends(&self) -> usize {
        self.ends.load(Ordering::Acquire)
    }
}

/// RAII guard for one tracked task
#[derive(Debug)]
pub struct InFlight<'a> {
    tracker: &'a ConcurrencyTracker,
    depth: usize,
}

impl InFlight<'_> {
    /// Concurrency depth at the moment this task started
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.tracker.on_end();
    }
}
