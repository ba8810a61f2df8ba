//! Shared test utilities for Surge crates
//!
//! This crate provides:
//! - **Fixtures**: Canonical batch configurations with test-friendly latencies
//! - **Mocks**: Slow operations that count, fail, block, or panic on demand
//! - **Assertions**: Chained assertions over batch summaries and event logs
//!
//! # Example
//!
//! ```ignore
//! use surge_tests::{assertions::SummaryAssertions, fixtures, mocks::CountingOperation};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_gated_batch() {
//!     let backend = CountingOperation::new(fixtures::FAST_LATENCY);
//!     let session = Session::default();
//!     let handle = session
//!         .start_batch(fixtures::configs::gated(9, 3).with_operation(backend.clone()))
//!         .unwrap();
//!
//!     let outcome = session.await_completion(handle).await.unwrap();
//!     SummaryAssertions::new(outcome.summary().unwrap())
//!         .assert_conserved()
//!         .assert_max_concurrency_at_most(3);
//! }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used items
pub use assertions::{EventAssertions, SummaryAssertions};
pub use fixtures::{configs, FAST_LATENCY};
pub use mocks::{BlockingOperation, CountingOperation, FlakyOperation, PanickingOperation};
