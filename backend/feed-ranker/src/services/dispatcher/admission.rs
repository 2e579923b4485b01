/// Admission control for the ranking request path
///
/// A fixed number of concurrency slots backed by a tokio semaphore. When all
/// slots are busy the policy either rejects at once or lets a bounded number of
/// requests wait for a bounded time.
use crate::error::{RankerError, Result};
use crate::metrics::exporter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Fail immediately when no slot is free
    Reject,
    /// Wait up to `max_wait` behind at most `max_depth` other waiters
    Queue { max_depth: usize, max_wait: Duration },
}

pub struct AdmissionControl {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    policy: AdmissionPolicy,
    queued: AtomicUsize,
}

/// A held concurrency slot; released on drop.
pub struct AdmissionPermit {
    permit: Option<OwnedSemaphorePermit>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        drop(self.permit.take());
        exporter::set_in_flight(self.capacity - self.semaphore.available_permits());
    }
}

/// Decrements the queue depth however the wait ends, including cancellation
struct QueueGuard<'a>(&'a AtomicUsize);

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdmissionControl {
    pub fn new(capacity: usize, policy: AdmissionPolicy) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            policy,
            queued: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub async fn acquire(&self) -> Result<AdmissionPermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => return Ok(self.wrap(permit)),
            Err(TryAcquireError::Closed) => return Err(Self::closed()),
            Err(TryAcquireError::NoPermits) => {}
        }

        let (max_depth, max_wait) = match self.policy {
            AdmissionPolicy::Reject => return Err(self.exhausted()),
            AdmissionPolicy::Queue {
                max_depth,
                max_wait,
            } => (max_depth, max_wait),
        };

        let reserved = self
            .queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                (depth < max_depth).then_some(depth + 1)
            });
        if reserved.is_err() {
            return Err(self.exhausted());
        }
        let _queued = QueueGuard(&self.queued);

        match timeout(max_wait, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(self.wrap(permit)),
            Ok(Err(_)) => Err(Self::closed()),
            Err(_) => Err(self.exhausted()),
        }
    }

    fn wrap(&self, permit: OwnedSemaphorePermit) -> AdmissionPermit {
        exporter::set_in_flight(self.in_flight());
        AdmissionPermit {
            permit: Some(permit),
            semaphore: self.semaphore.clone(),
            capacity: self.capacity,
        }
    }

    fn exhausted(&self) -> RankerError {
        RankerError::ResourceExhausted {
            in_flight: self.in_flight(),
            queued: self.queued(),
        }
    }

    fn closed() -> RankerError {
        RankerError::Internal("admission semaphore closed".to_string())
    }
}
