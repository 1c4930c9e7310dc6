//! Bounded-parallelism admission gate around scrape operations.
//!
//! A fixed number of extractions may run concurrently system-wide;
//! excess requests wait their turn in FIFO order. The gate does not
//! dedupe requests for the same source, and one item's failure never
//! affects another's. In-flight and high-water counters are exposed so
//! tests can observe the bound.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Admission gate with a fixed concurrency limit.
pub struct ScrapeQueue {
    semaphore: Arc<Semaphore>,
    limit: usize,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

impl ScrapeQueue {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Currently admitted operations.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest concurrent admission observed since construction.
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    /// Run an operation once a slot frees up.
    ///
    /// Waiters are served in FIFO order (the semaphore is fair). The
    /// permit is held for the operation's full duration.
    pub async fn admit<F, T>(&self, operation: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("queue semaphore never closes");

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);

        let result = operation.await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
