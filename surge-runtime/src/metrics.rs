//! Prometheus metrics for batch execution
//!
//! All metrics live in the default Prometheus registry and aggregate across
//! every batch in the process.
//!
//! # Example Queries
//!
//! ```promql
//! # Task failure ratio (last 5 minutes)
//! sum(rate(surge_tasks_total{status="failed"}[5m]))
//! / sum(rate(surge_tasks_total[5m]))
//!
//! # P99 time spent waiting at the admission gate
//! histogram_quantile(0.99, rate(surge_gate_wait_seconds_bucket[5m]))
//! ```

use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::LazyLock;

/// Total number of tasks by final status.
///
/// Labels:
/// - `status`: succeeded | failed | canceled
pub static TASKS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "surge_tasks_total",
        "Total number of tasks by final status",
        &["status"]
    )
    .expect("surge_tasks_total metric registration")
});

/// Time from admission to completion of a task, in seconds.
///
/// Labels:
/// - `status`: succeeded | failed | canceled
///
/// Buckets: 10ms to 30s
pub static TASK_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "surge_task_duration_seconds",
        "Time from admission to completion of a task",
        &["status"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("surge_task_duration_seconds metric registration")
});

/// Time spent waiting for an admission gate permit, in seconds.
///
/// Buckets: 1ms to 30s
pub static GATE_WAIT_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "surge_gate_wait_seconds",
        "Time spent waiting for an admission gate permit",
        vec![0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("surge_gate_wait_seconds metric registration")
});

/// Tasks currently in their working state across all batches
pub static TASKS_IN_FLIGHT: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "surge_tasks_in_flight",
        "Tasks currently in their working state"
    )
    .expect("surge_tasks_in_flight metric registration")
});

/// Total number of batches by terminal outcome.
///
/// Labels:
/// - `outcome`: completed | canceled
pub static BATCHES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "surge_batches_total",
        "Total number of batches by terminal outcome",
        &["outcome"]
    )
    .expect("surge_batches_total metric registration")
});

/// Record a finished task
pub fn record_task(status: &str, duration_secs: f64) {
    TASKS_TOTAL.with_label_values(&[status]).inc();
    TASK_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration_secs);
}

/// Render the default registry in the Prometheus text exposition format
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
