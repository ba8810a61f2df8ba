//! Test data factories for Surge types
//!
//! Provides batch configurations with short latencies so paused-clock tests
//! stay readable. Use these for quick test setup without needing to specify
//! every field.

use std::time::Duration;

/// Latency used by fixtures; small enough to keep real-clock tests fast
pub const FAST_LATENCY: Duration = Duration::from_millis(100);

/// Batch configuration factories
pub mod configs {
    use super::*;
    use surge_runtime::{BatchConfig, ResourceIdentity};

    /// Every task released at once
    pub fn unbounded(tasks: i64) -> BatchConfig {
        BatchConfig::new(tasks, 0).with_latency(FAST_LATENCY)
    }

    /// Tasks admitted through a gate with `permits` permits
    pub fn gated(tasks: i64, permits: i64) -> BatchConfig {
        BatchConfig::new(tasks, permits).with_latency(FAST_LATENCY)
    }

    /// Tasks cycling over `ids` resources
    pub fn round_robin(tasks: i64, permits: i64, ids: u64) -> BatchConfig {
        gated(tasks, permits).with_identity(ResourceIdentity::RoundRobin { ids })
    }

    /// A batch long enough to still be running when a test acts on it
    pub fn long_running(tasks: i64, permits: i64) -> BatchConfig {
        BatchConfig::new(tasks, permits).with_latency(Duration::from_secs(3600))
    }

    /// Configurations the session must reject
    pub fn invalid() -> Vec<BatchConfig> {
        vec![
            BatchConfig::new(0, 3),
            BatchConfig::new(-4, 0),
            BatchConfig::new(5, -1),
            unbounded(5).with_identity(ResourceIdentity::RoundRobin { ids: 0 }),
        ]
    }
}
