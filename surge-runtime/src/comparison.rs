//! Side-by-side comparison of unbounded and gated execution
//!
//! Runs the same workload twice, once with every task released at once and
//! once through an admission gate, and reports what each mode cost.

use crate::batch::{BatchConfig, BatchOutcome, BatchSummary, ResourceIdentity};
use crate::operation::SlowOperation;
use crate::session::Session;
use crate::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Expected elapsed time ignoring scheduling overhead.
///
/// Unbounded batches take one latency; gated batches run in
/// `ceil(task_count / permits)` waves.
pub fn theoretical_elapsed(task_count: usize, permits: usize, latency: Duration) -> Duration {
    if permits == 0 || task_count == 0 {
        return if task_count == 0 { Duration::ZERO } else { latency };
    }
    let waves = task_count.div_ceil(permits);
    latency.saturating_mul(u32::try_from(waves).unwrap_or(u32::MAX))
}

/// Results of an unbounded and a gated run of the same workload
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub task_count: usize,
    pub permits: usize,
    pub latency: Duration,
    pub unbounded: BatchSummary,
    pub bounded: BatchSummary,
    pub theoretical_unbounded: Duration,
    pub theoretical_bounded: Duration,
}

/// Run the workload unbounded, then with `permits` permits
pub async fn compare(
    operation: Arc<dyn SlowOperation>,
    task_count: i64,
    permits: i64,
    latency: Duration,
    identity: ResourceIdentity,
) -> Result<ComparisonReport> {
    if permits <= 0 {
        return Err(Error::InvalidConfiguration(format!(
            "comparison needs a positive permit count, got {}",
            permits
        )));
    }

    let session = Session::default();
    let base = BatchConfig::new(task_count, 0)
        .with_latency(latency)
        .with_identity(identity)
        .with_operation(operation);

    let unbounded_config = base.clone().with_label("comparison: unbounded");
    let unbounded = run_to_summary(&session, unbounded_config).await?;

    let bounded_config = BatchConfig {
        permits,
        ..base.with_label("comparison: gated")
    };
    let bounded = run_to_summary(&session, bounded_config).await?;

    let tasks = unbounded.total_tasks;
    let permits = bounded.permits;

    Ok(ComparisonReport {
        task_count: tasks,
        permits,
        latency,
        theoretical_unbounded: theoretical_elapsed(tasks, 0, latency),
        theoretical_bounded: theoretical_elapsed(tasks, permits, latency),
        unbounded,
        bounded,
    })
}

async fn run_to_summary(session: &Session, config: BatchConfig) -> Result<BatchSummary> {
    let handle = session.start_batch(config)?;
    match session.await_completion(handle).await? {
        BatchOutcome::Completed(summary) => Ok(summary),
        BatchOutcome::Canceled { batch_id, .. } => Err(Error::CancellationSignaled(format!(
            "comparison batch {} was canceled",
            batch_id
        ))),
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unbounded_ms = self.unbounded.elapsed.as_millis();
        let bounded_ms = self.bounded.elapsed.as_millis();

        writeln!(f, "┌──────────────────┬───────────────┬───────────────┐")?;
        writeln!(
            f,
            "│                  │  no gate      │  gate ({:>3})   │",
            self.permits
        )?;
        writeln!(f, "├──────────────────┼───────────────┼───────────────┤")?;
        writeln!(
            f,
            "│ elapsed          │ {:>11}ms │ {:>11}ms │",
            unbounded_ms, bounded_ms
        )?;
        writeln!(
            f,
            "│ max concurrency  │ {:>13} │ {:>13} │",
            self.unbounded.max_concurrency, self.bounded.max_concurrency
        )?;
        writeln!(
            f,
            "│ failed           │ {:>13} │ {:>13} │",
            self.unbounded.failed, self.bounded.failed
        )?;
        writeln!(f, "│ backend load     │          high │           low │")?;
        writeln!(f, "└──────────────────┴───────────────┴───────────────┘")?;
        writeln!(f)?;
        writeln!(f, "analysis:")?;
        writeln!(
            f,
            "  - no gate: {}ms ({} concurrent)",
            unbounded_ms, self.unbounded.max_concurrency
        )?;
        writeln!(
            f,
            "  - gate:    {}ms (at most {} concurrent)",
            bounded_ms, self.bounded.max_concurrency
        )?;
        writeln!(f)?;
        writeln!(f, "  the gate takes longer but keeps backend load bounded.")?;
        writeln!(f)?;
        writeln!(f, "  theoretical time:")?;
        writeln!(
            f,
            "  - no gate: ~{}ms (all at once)",
            self.theoretical_unbounded.as_millis()
        )?;
        write!(
            f,
            "  - gate:    ~{}ms ({} at a time)",
            self.theoretical_bounded.as_millis(),
            self.permits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::DelayedOperation;

    #[test]
    fn test_theoretical_elapsed() {
        let latency = Duration::from_millis(100);
        assert_eq!(theoretical_elapsed(9, 3, latency), Duration::from_millis(300));
        assert_eq!(theoretical_elapsed(10, 3, latency), Duration::from_millis(400));
        assert_eq!(theoretical_elapsed(9, 0, latency), latency);
        assert_eq!(theoretical_elapsed(2, 5, latency), latency);
        assert_eq!(theoretical_elapsed(0, 3, latency), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compare() {
        let latency = Duration::from_millis(500);
        let report = compare(
            Arc::new(DelayedOperation::new(latency)),
            10,
            3,
            latency,
            ResourceIdentity::RoundRobin { ids: 3 },
        )
        .await
        .unwrap();

        assert_eq!(report.unbounded.max_concurrency, 10);
        assert_eq!(report.bounded.max_concurrency, 3);
        assert_eq!(report.unbounded.elapsed, report.theoretical_unbounded);
        assert_eq!(report.bounded.elapsed, report.theoretical_bounded);
        assert_eq!(report.theoretical_bounded, Duration::from_millis(2000));

        let rendered = report.to_string();
        assert!(rendered.contains("max concurrency"));
        assert!(rendered.contains("~2000ms (3 at a time)"));
    }

    #[tokio::test]
    async fn test_compare_requires_permits() {
        let err = compare(
            Arc::new(DelayedOperation::new(Duration::from_millis(1))),
            5,
            0,
            Duration::from_millis(1),
            ResourceIdentity::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }
}
