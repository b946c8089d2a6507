//! Bulkhead: bounded concurrency with a bounded, time-limited wait queue.
//!
//! Up to `max_concurrent` calls run at once. Further calls wait in FIFO order, at most
//! `max_queue_size` of them, each for at most `queue_timeout`. A call arriving to a full
//! queue is shed immediately with [`PolicyError::BulkheadRejected`]; a queued call whose
//! wait expires fails with [`PolicyError::Timeout`].
//!
//! Two tokio semaphores do the work. The admission semaphore holds
//! `max_concurrent + max_queue_size` permits and is only ever tried, never awaited, so a
//! full queue sheds load at once. The execution semaphore holds `max_concurrent` permits;
//! tokio queues its waiters in FIFO order and hands a released permit straight to the
//! oldest one. Both permits are owned by the call and dropped on every exit path, including
//! a panic inside the operation or the caller dropping the `execute` future.

use crate::config::BulkheadConfig;
use crate::error::PolicyError;
use crate::policy::{ErasedOperation, ErasedResult, Policy, PolicyKind};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Occupancy of a bulkhead at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkheadStats {
    pub available_permits: usize,
    pub queue_length: usize,
    pub max_concurrent: usize,
    pub max_queue_size: usize,
}

impl BulkheadStats {
    /// Calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent.saturating_sub(self.available_permits)
    }
}

/// Concurrency limiter. Clones share slots and queue.
#[derive(Debug, Clone)]
pub struct Bulkhead {
    name: Arc<str>,
    config: BulkheadConfig,
    admission: Arc<Semaphore>,
    execution: Arc<Semaphore>,
}

impl Bulkhead {
    pub fn new(config: BulkheadConfig) -> Self {
        let admitted = config.max_concurrent().saturating_add(config.max_queue_size());
        Self {
            name: Arc::from("bulkhead"),
            admission: Arc::new(Semaphore::new(admitted.min(Semaphore::MAX_PERMITS))),
            execution: Arc::new(Semaphore::new(config.max_concurrent().min(Semaphore::MAX_PERMITS))),
            config,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    pub fn stats(&self) -> BulkheadStats {
        BulkheadStats {
            available_permits: self.execution.available_permits(),
            queue_length: self.queue_length(),
            max_concurrent: self.config.max_concurrent(),
            max_queue_size: self.config.max_queue_size(),
        }
    }

    /// Whether the queue has room. A call may still wait even when this is true.
    pub fn is_available(&self) -> bool {
        self.queue_length() < self.config.max_queue_size()
    }

    /// Admitted calls that do not hold an execution permit yet.
    fn queue_length(&self) -> usize {
        let max_concurrent = self.config.max_concurrent();
        let max_admitted = max_concurrent.saturating_add(self.config.max_queue_size());
        let admitted = held(&self.admission, max_admitted);
        let running = held(&self.execution, max_concurrent);
        admitted.saturating_sub(running)
    }

    /// Run `operation` once a slot is free.
    ///
    /// # Errors
    /// - [`PolicyError::BulkheadRejected`] when every slot is busy and the queue is full.
    /// - [`PolicyError::Timeout`] when queued longer than `queue_timeout`.
    /// - Whatever the operation returned otherwise.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, PolicyError<E>>
    where
        Fut: Future<Output = Result<T, PolicyError<E>>>,
        Op: FnOnce() -> Fut,
    {
        let Ok(admission) = Arc::clone(&self.admission).try_acquire_owned() else {
            let queue_length = self.queue_length();
            let max_queue_size = self.config.max_queue_size();
            tracing::warn!(
                bulkhead = %self.name,
                queue_length,
                max_queue_size,
                "Bulkhead: queue full, rejecting call"
            );
            return Err(PolicyError::BulkheadRejected { queue_length, max_queue_size });
        };

        let execution = match Arc::clone(&self.execution).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => self.wait_for_slot::<E>().await?,
        };

        let result = operation().await;
        drop(execution);
        drop(admission);
        result
    }

    async fn wait_for_slot<E>(&self) -> Result<OwnedSemaphorePermit, PolicyError<E>> {
        let limit = self.config.queue_timeout();
        tracing::debug!(
            bulkhead = %self.name,
            queue_length = self.queue_length(),
            "Bulkhead: all slots busy, queueing call"
        );
        let started = Instant::now();
        // `timeout` polls the acquire before the deadline, so a permit handed over before
        // the waiter is polled again is kept even if the deadline has passed by then.
        match tokio::time::timeout(limit, Arc::clone(&self.execution).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            // The execution semaphore is never closed, so only the deadline ends the wait.
            Ok(Err(_)) | Err(_) => {
                let waited = started.elapsed();
                tracing::warn!(
                    bulkhead = %self.name,
                    waited_ms = waited.as_millis() as u64,
                    "Bulkhead: queue wait timed out"
                );
                Err(PolicyError::Timeout { waited, limit })
            }
        }
    }
}

fn held(semaphore: &Semaphore, permits: usize) -> usize {
    permits.min(Semaphore::MAX_PERMITS).saturating_sub(semaphore.available_permits())
}

impl<E> Policy<E> for Bulkhead
where
    E: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Bulkhead
    }

    fn execute_erased<'a>(
        &'a self,
        operation: ErasedOperation<'a, E>,
    ) -> BoxFuture<'a, ErasedResult<E>> {
        Box::pin(self.execute(move || operation()))
    }
}
