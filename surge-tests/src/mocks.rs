//! Mock slow operations
//!
//! Stand-ins for the backend that let tests observe what reached it, inject
//! failures, hold requests open, or crash a task.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_runtime::{OperationError, Payload, SlowOperation};
use tokio::sync::{watch, Semaphore};

fn payload(resource_id: u64) -> Payload {
    Payload {
        resource_id,
        body: format!("resource-{}", resource_id),
    }
}

/// Backend that counts calls per resource and the peak number of calls
/// in progress at once.
///
/// The peak is measured inside the operation, independently of the runner's
/// own tracker, so tests can check what the backend actually saw.
#[derive(Debug)]
pub struct CountingOperation {
    latency: Duration,
    calls: Mutex<HashMap<u64, usize>>,
    in_progress: AtomicUsize,
    peak: AtomicUsize,
}

impl CountingOperation {
    pub fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            calls: Mutex::new(HashMap::new()),
            in_progress: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Calls made for one resource
    pub fn calls_for(&self, resource_id: u64) -> usize {
        self.calls.lock().get(&resource_id).copied().unwrap_or(0)
    }

    /// Calls made across all resources
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Highest number of calls in progress at the same time
    pub fn peak_in_progress(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    /// Calls in progress right now
    pub fn in_progress(&self) -> usize {
        self.in_progress.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SlowOperation for CountingOperation {
    async fn invoke(&self, resource_id: u64) -> Result<Payload, OperationError> {
        *self.calls.lock().entry(resource_id).or_default() += 1;
        let depth = self.in_progress.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(depth, Ordering::AcqRel);

        tokio::time::sleep(self.latency).await;

        self.in_progress.fetch_sub(1, Ordering::AcqRel);
        Ok(payload(resource_id))
    }
}

/// Backend that fails every `every`th call
#[derive(Debug)]
pub struct FlakyOperation {
    latency: Duration,
    every: usize,
    calls: AtomicUsize,
}

impl FlakyOperation {
    pub fn new(latency: Duration, every: usize) -> Arc<Self> {
        Arc::new(Self {
            latency,
            every: every.max(1),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SlowOperation for FlakyOperation {
    async fn invoke(&self, resource_id: u64) -> Result<Payload, OperationError> {
        let call = self.calls.fetch_add(1, Ordering::AcqRel) + 1;
        tokio::time::sleep(self.latency).await;

        if call % self.every == 0 {
            return Err(OperationError::new(resource_id, format!("call {} rejected", call)));
        }
        Ok(payload(resource_id))
    }
}

/// Backend that holds every call open until the test releases it
#[derive(Debug)]
pub struct BlockingOperation {
    gate: Semaphore,
    started: watch::Sender<usize>,
}

impl BlockingOperation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            started: watch::Sender::new(0),
        })
    }

    /// Let `count` held calls finish
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Calls that have reached the backend so far
    pub fn started(&self) -> usize {
        *self.started.borrow()
    }

    /// Wait until at least `count` calls have reached the backend
    pub async fn wait_for_started(&self, count: usize) {
        let mut rx = self.started.subscribe();
        // The sender lives in self, so the channel cannot close here.
        let _ = rx.wait_for(|started| *started >= count).await;
    }
}

#[async_trait]
impl SlowOperation for BlockingOperation {
    async fn invoke(&self, resource_id: u64) -> Result<Payload, OperationError> {
        self.started.send_modify(|started| *started += 1);

        match self.gate.acquire().await {
            Ok(permit) => {
                permit.forget();
                Ok(payload(resource_id))
            }
            Err(_) => Err(OperationError::new(resource_id, "backend shut down")),
        }
    }
}

/// Backend that panics for selected resources
#[derive(Debug)]
pub struct PanickingOperation {
    latency: Duration,
    panicking: HashSet<u64>,
}

impl PanickingOperation {
    pub fn new(latency: Duration, panicking: impl IntoIterator<Item = u64>) -> Arc<Self> {
        Arc::new(Self {
            latency,
            panicking: panicking.into_iter().collect(),
        })
    }
}

#[async_trait]
impl SlowOperation for PanickingOperation {
    async fn invoke(&self, resource_id: u64) -> Result<Payload, OperationError> {
        tokio::time::sleep(self.latency).await;

        if self.panicking.contains(&resource_id) {
            panic!("backend crashed on resource {}", resource_id);
        }
        Ok(payload(resource_id))
    }
}
