//! # Surge Runtime
//!
//! Bounded-concurrency task runner with concurrency instrumentation.
//!
//! A [`Session`] launches batches of tasks against a [`SlowOperation`],
//! optionally through an [`AdmissionGate`], and records how deep concurrency
//! went, how long the batch took, and an ordered event log describing what
//! happened.

pub mod batch;
pub mod comparison;
pub mod concurrency;
pub mod config;
pub mod events;
pub mod metrics;
pub mod operation;
pub mod runner;
pub mod scenarios;
pub mod session;
pub mod state_machine;
pub mod tracker;

// Re-export commonly used types
pub use batch::{
    BatchConfig, BatchId, BatchOutcome, BatchSnapshot, BatchSummary, ResourceIdentity,
    TaskOutcome, TaskResult,
};
pub use comparison::{compare, theoretical_elapsed, ComparisonReport};
pub use concurrency::{AdmissionGate, GatePermit};
pub use config::SessionConfig;
pub use events::{EventLog, LogEvent, Severity};
pub use operation::{DelayedOperation, OperationError, Payload, SlowOperation};
pub use scenarios::Scenario;
pub use session::{BatchHandle, Session};
pub use state_machine::{BatchState, StateMachine};
pub use tracker::{ConcurrencyTracker, InFlight};

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for runtime operations
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Operation failure: {0}")]
    OperationFailure(String),

    #[error("Cancellation signaled: {0}")]
    CancellationSignaled(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
