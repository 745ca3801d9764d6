//! Counting-permit gate for capacity-constrained backends

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{AppError, Result};

/// Bounds the number of simultaneous calls against one backend.
///
/// Waiters are served in arrival order: tokio's semaphore is fair, so a
/// caller that starts waiting first gets the next free permit.
pub struct ConcurrencyLimiter {
    name: String,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    waiting: AtomicU64,
    acquired_total: AtomicU64,
}

/// Right to make one call against the guarded backend.
///
/// The slot goes back to the pool exactly once: on [`Permit::release`] or
/// when the permit is dropped, whichever happens first.
#[derive(Debug)]
pub struct Permit {
    _inner: OwnedSemaphorePermit,
}

impl Permit {
    /// Give the slot back now
    pub fn release(self) {}
}

impl ConcurrencyLimiter {
    /// Create a limiter with a fixed capacity (at least one)
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            waiting: AtomicU64::new(0),
            acquired_total: AtomicU64::new(0),
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<Permit> {
        self.waiting.fetch_add(1, Ordering::Relaxed);
        let permit = self.semaphore.clone().acquire_owned().await;
        self.waiting.fetch_sub(1, Ordering::Relaxed);

        let permit = permit.map_err(|_| {
            AppError::Internal(format!("Limiter '{}' has been closed", self.name))
        })?;
        self.acquired_total.fetch_add(1, Ordering::Relaxed);

        debug!(
            limiter = %self.name,
            available = self.semaphore.available_permits(),
            "Acquired permit"
        );
        Ok(Permit { _inner: permit })
    }

    /// Run `operation` while holding a permit; the permit is released on every exit path
    pub async fn run<F, T>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self.acquire().await?;
        operation.await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free right now
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Callers currently queued for a slot
    pub fn waiting(&self) -> u64 {
        self.waiting.load(Ordering::Relaxed)
    }

    /// Get limiter statistics
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            capacity: self.capacity,
            available: self.available(),
            waiting: self.waiting(),
            acquired_total: self.acquired_total.load(Ordering::Relaxed),
        }
    }
}

/// Limiter statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterStats {
    pub capacity: usize,
    pub available: usize,
    pub waiting: u64,
    pub acquired_total: u64,
}
