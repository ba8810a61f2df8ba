//! Progress display for running batches

use anyhow::{Context, Result};
use std::time::Duration;
use surge_runtime::{
    BatchHandle, BatchOutcome, BatchSnapshot, BatchState, LogEvent, Session, Severity,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, timeout};
use tracing::debug;

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "ℹ",
        Severity::Warning => "⚠",
        Severity::Error => "✗",
        Severity::Success => "✓",
        Severity::Request => "→",
    }
}

/// Render one event as a terminal line
pub fn format_event(event: &LogEvent) -> String {
    if event.message.is_empty() {
        return String::new();
    }
    format!(
        "[{}] {} {}",
        event.timestamp.format("%H:%M:%S%.3f"),
        severity_icon(event.severity),
        event.message
    )
}

/// Display batch progress to the user
pub fn display_snapshot(snapshot: &BatchSnapshot) {
    let status_icon = match snapshot.state {
        BatchState::Idle => "⏳",
        BatchState::Running => "🔄",
        BatchState::Completed => "✅",
        BatchState::Canceled => "🚫",
    };

    println!(
        "{} Batch {} is {}: {}/{} done, {} failed, {} in flight (max {}), {:.1}s",
        status_icon,
        snapshot.batch_id,
        snapshot.state,
        snapshot.completed + snapshot.failed,
        snapshot.total,
        snapshot.failed,
        snapshot.current_concurrency,
        snapshot.max_concurrency,
        snapshot.elapsed.as_secs_f64()
    );
}

/// Print every event at or after `next` and return the following sequence
fn flush_events(events: &[LogEvent], mut next: u64) -> u64 {
    for event in events.iter() {
        if event.sequence < next {
            continue;
        }
        println!("{}", format_event(event));
        next = event.sequence + 1;
    }
    next
}

/// Stream the batch's events until it reaches a terminal state
///
/// Events missed by a lagging subscription are recovered from the log by
/// sequence number, so every event is printed exactly once and in order.
pub async fn follow_events(
    session: &Session,
    handle: BatchHandle,
    timeout_duration: Duration,
) -> Result<BatchOutcome> {
    // Subscribe before reading the backlog so nothing falls between the two
    let mut events = session.subscribe(handle)?;
    let mut next = flush_events(&session.observe(handle)?.events, 0);

    let result = timeout(timeout_duration, async {
        let completion = session.await_completion(handle);
        tokio::pin!(completion);

        loop {
            tokio::select! {
                outcome = &mut completion => {
                    let outcome = outcome.context("Failed to wait for batch")?;
                    flush_events(&session.observe(handle)?.events, next);
                    return Ok(outcome);
                }
                received = events.recv() => match received {
                    Ok(event) if event.sequence >= next => {
                        println!("{}", format_event(&event));
                        next = event.sequence + 1;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Event subscription lagged by {} events, replaying", skipped);
                        next = flush_events(&session.observe(handle)?.events, next);
                    }
                    Err(RecvError::Closed) => {
                        let outcome = (&mut completion)
                            .await
                            .context("Failed to wait for batch")?;
                        flush_events(&session.observe(handle)?.events, next);
                        return Ok(outcome);
                    }
                },
            }
        }
    })
    .await;

    match result {
        Ok(outcome) => outcome,
        Err(_) => {
            anyhow::bail!(
                "Batch {} did not complete within timeout of {:?}",
                handle,
                timeout_duration
            )
        }
    }
}

/// Poll batch snapshots until it reaches a terminal state
pub async fn poll_batch_status(
    session: &Session,
    handle: BatchHandle,
    timeout_duration: Duration,
    poll_interval_duration: Duration,
) -> Result<BatchOutcome> {
    debug!(
        "Starting to poll batch {} with timeout {:?} and interval {:?}",
        handle, timeout_duration, poll_interval_duration
    );

    let mut poll_ticker = interval(poll_interval_duration);

    let result = timeout(timeout_duration, async {
        loop {
            poll_ticker.tick().await;

            let snapshot = session
                .observe(handle)
                .context("Failed to fetch batch status")?;

            debug!("Polled batch {}: state = {}", handle, snapshot.state);
            display_snapshot(&snapshot);

            if snapshot.state.is_terminal() {
                return session
                    .await_completion(handle)
                    .await
                    .context("Failed to fetch batch outcome");
            }
        }
    })
    .await;

    match result {
        Ok(outcome) => outcome,
        Err(_) => {
            anyhow::bail!(
                "Batch {} did not complete within timeout of {:?}",
                handle,
                timeout_duration
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use surge_runtime::BatchConfig;

    #[test]
    fn test_format_event() {
        let event = LogEvent {
            sequence: 3,
            timestamp: Utc::now(),
            severity: Severity::Error,
            task: Some(2),
            message: "[2] failed: resource 2: resource unavailable".to_string(),
        };
        let line = format_event(&event);
        assert!(line.contains("✗ [2] failed"));

        let blank = LogEvent {
            message: String::new(),
            ..event
        };
        assert_eq!(format_event(&blank), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_events_returns_outcome() {
        let session = Session::default();
        let handle = session
            .start_batch(BatchConfig::new(4, 2).with_latency(Duration::from_millis(50)))
            .unwrap();

        let outcome = follow_events(&session, handle, Duration::from_secs(5))
            .await
            .unwrap();
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.completed, 4);
        assert_eq!(summary.max_concurrency, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_batch_status_returns_outcome() {
        let session = Session::default();
        let handle = session
            .start_batch(BatchConfig::new(3, 0).with_latency(Duration::from_millis(50)))
            .unwrap();

        let outcome = poll_batch_status(
            &session,
            handle,
            Duration::from_secs(5),
            Duration::from_millis(20),
        )
        .await
        .unwrap();
        assert_eq!(outcome.summary().unwrap().max_concurrency, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out() {
        let session = Session::default();
        let handle = session
            .start_batch(BatchConfig::new(1, 0).with_latency(Duration::from_secs(60)))
            .unwrap();

        let err = poll_batch_status(
            &session,
            handle,
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("did not complete"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_stops_on_canceled_batch() {
        let session = Session::default();
        let handle = session
            .start_batch(BatchConfig::new(2, 1).with_latency(Duration::from_secs(60)))
            .unwrap();
        session.reset();

        let outcome = poll_batch_status(
            &session,
            handle,
            Duration::from_secs(5),
            Duration::from_millis(20),
        )
        .await
        .unwrap();
        assert!(outcome.is_canceled());
        assert_eq!(session.observe(handle).unwrap().state, BatchState::Canceled);
    }
}
