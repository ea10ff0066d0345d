//! Bounds how many jobs execute at once
//!
//! Up to `capacity` jobs hold a permit. Up to `backlog` more may wait for one;
//! anything beyond that is turned away immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("server overloaded: {waiting} jobs already waiting")]
    Overloaded { waiting: usize },

    #[error("admission controller closed")]
    Closed,
}

/// Semaphore-backed admission control shared by every job submission
#[derive(Debug, Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    capacity: usize,
    backlog: usize,
}

/// Running slot held for the lifetime of a job
///
/// The slot is released when this is dropped.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    pub fn new(capacity: usize, backlog: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            waiting: Arc::new(AtomicUsize::new(0)),
            capacity,
            backlog,
        }
    }

    /// Acquire a running slot, waiting if the backlog has room
    pub async fn admit(&self) -> Result<AdmissionPermit, AdmissionError> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(AdmissionPermit { _permit: permit });
        }

        let reserved = self
            .waiting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |waiting| {
                (waiting < self.backlog).then_some(waiting + 1)
            });
        if let Err(waiting) = reserved {
            debug!(waiting, backlog = self.backlog, "rejecting job, backlog full");
            return Err(AdmissionError::Overloaded { waiting });
        }

        let _guard = WaitingGuard(&self.waiting);
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| AdmissionError::Closed)?;

        Ok(AdmissionPermit { _permit: permit })
    }

    /// Number of jobs currently holding a slot
    pub fn running(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Number of jobs waiting for a slot
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn backlog(&self) -> usize {
        self.backlog
    }
}

/// Releases a backlog reservation however the wait ends
struct WaitingGuard<'a>(&'a AtomicUsize);

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
