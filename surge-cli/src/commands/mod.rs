//! CLI command implementations

pub mod compare;
pub mod run;
pub mod scenario;

use crate::polling;
use anyhow::{Context, Result};
use std::time::Duration;
use surge_runtime::{metrics, BatchHandle, BatchOutcome, Session};

/// How a batch command reports progress and results
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub watch: bool,
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub json: bool,
    pub metrics: bool,
}

/// Wait for a started batch, reporting progress the way the options ask
pub async fn drive(
    session: &Session,
    handle: BatchHandle,
    options: &OutputOptions,
) -> Result<BatchOutcome> {
    let outcome = if options.json {
        tokio::time::timeout(options.timeout, session.await_completion(handle))
            .await
            .with_context(|| {
                format!(
                    "Batch {} did not complete within {:?}",
                    handle, options.timeout
                )
            })??
    } else if options.watch {
        polling::poll_batch_status(session, handle, options.timeout, options.poll_interval).await?
    } else {
        polling::follow_events(session, handle, options.timeout).await?
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    if options.metrics {
        println!();
        print!("{}", metrics::gather_text());
    }

    Ok(outcome)
}

fn print_outcome(outcome: &BatchOutcome) {
    match outcome {
        BatchOutcome::Completed(summary) => println!(
            "\nBatch {} finished: {} of {} succeeded, {} failed, max concurrency {}",
            summary.batch_id,
            summary.completed,
            summary.total_tasks,
            summary.failed,
            summary.max_concurrency
        ),
        BatchOutcome::Canceled {
            batch_id,
            total_tasks,
            completed,
            failed,
        } => println!(
            "\nBatch {} canceled after {} succeeded and {} failed of {}",
            batch_id, completed, failed, total_tasks
        ),
    }
}
