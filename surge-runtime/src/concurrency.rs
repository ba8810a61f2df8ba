//! Admission gate bounding how many tasks may run the guarded section at once

use crate::metrics::GATE_WAIT_SECONDS;
use crate::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;

/// Bounded-concurrency limiter.
///
/// With `permits == 0` the gate is open: `acquire` returns immediately and
/// nothing is throttled. Otherwise at most `permits` holders exist at any time.
/// Waiters are admitted in FIFO order.
#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Option<Semaphore>,
    permits: usize,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl AdmissionGate {
    /// Create a gate with `permits` slots; `0` means unlimited
    pub fn new(permits: i64) -> Result<Self> {
        if permits < 0 {
            return Err(Error::InvalidConfiguration(format!(
                "permits must be non-negative, got {}",
                permits
            )));
        }

        let permits = usize::try_from(permits).map_err(|_| {
            Error::InvalidConfiguration(format!("permits {} exceeds platform limits", permits))
        })?;
        if permits > Semaphore::MAX_PERMITS {
            return Err(Error::InvalidConfiguration(format!(
                "permits {} exceeds the maximum of {}",
                permits,
                Semaphore::MAX_PERMITS
            )));
        }

        Ok(Self {
            semaphore: (permits > 0).then(|| Semaphore::new(permits)),
            permits,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        })
    }

    /// Wait for a permit.
    ///
    /// The returned guard gives the permit back when dropped, so release
    /// happens on every exit path of the guarded section.
    #[tracing::instrument(
        name = "gate.acquire",
        skip(self),
        fields(
            permits = %self.permits,
            available_before = tracing::field::Empty,
            wait_duration_ms = tracing::field::Empty,
        )
    )]
    pub async fn acquire(&self) -> Result<GatePermit<'_>> {
        let start = Instant::now();

        let permit = match &self.semaphore {
            Some(semaphore) => {
                let span = tracing::Span::current();
                span.record("available_before", semaphore.available_permits());

                let permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| Error::Internal(format!("admission gate closed: {}", e)))?;
                Some(permit)
            }
            None => None,
        };

        let waited = start.elapsed();
        tracing::Span::current().record("wait_duration_ms", waited.as_millis() as u64);
        GATE_WAIT_SECONDS.observe(waited.as_secs_f64());

        self.acquired.fetch_add(1, Ordering::AcqRel);
        Ok(GatePermit {
            gate: self,
            _permit: permit,
        })
    }

    /// Whether the gate actually limits concurrency
    pub fn is_bounded(&self) -> bool {
        self.semaphore.is_some()
    }

    /// Configured permit count (`0` for unlimited)
    pub fn permits(&self) -> usize {
        self.permits
    }

    /// Currently available permits, `None` when unlimited
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(Semaphore::available_permits)
    }

    /// Number of successful `acquire` calls
    pub fn acquisitions(&self) -> usize {
        self.acquired.load(Ordering::Acquire)
    }

    /// Number of permits handed back
    pub fn releases(&self) -> usize {
        self.released.load(Ordering::Acquire)
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::AcqRel);
    }
}

/// Permit held while a task is admitted.
///
/// Dropping it releases the underlying semaphore slot (if any) and counts
/// the release.
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a AdmissionGate,
    _permit: Option<SemaphorePermit<'a>>,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
