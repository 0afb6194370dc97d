//! Bounded worker pool shared by every fan-out
//!
//! The pool is a semaphore sized once at start-up plus the tokio runtime it
//! was created on. Units are spawned immediately and then wait for a permit,
//! so submitting a batch never blocks on slow hosts while at most `size`
//! units run at the same time.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tokio::task::{Id, JoinSet};
use tracing::{debug, info};

use crate::error::FanOutError;

/// Process-wide bounded executor for host operations
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    runtime: Handle,
    closed: AtomicBool,
    submitted: AtomicU64,
    /// Units submitted and not yet finished, queued ones included
    in_flight: Arc<watch::Sender<usize>>,
}

/// Decrements the in-flight count when a unit ends, even by panic or abort
struct InFlightGuard(Arc<watch::Sender<usize>>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n -= 1);
    }
}

impl WorkerPool {
    /// Create a pool running at most `workers` units concurrently
    ///
    /// Must be called from within a tokio runtime; units are spawned on it.
    ///
    /// # Errors
    /// Returns `ConfigError` if `workers` is zero or too large, or if there
    /// is no current runtime.
    pub fn new(workers: usize) -> Result<Self, FanOutError> {
        if workers == 0 {
            return Err(FanOutError::ConfigError(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        if workers > Semaphore::MAX_PERMITS {
            return Err(FanOutError::ConfigError(format!(
                "too many workers: {workers}"
            )));
        }
        let runtime = Handle::try_current()
            .map_err(|e| FanOutError::ConfigError(format!("no tokio runtime: {e}")))?;

        info!(workers, "worker pool created");

        Ok(Self {
            permits: Arc::new(Semaphore::new(workers)),
            size: workers,
            runtime,
            closed: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            in_flight: Arc::new(watch::Sender::new(0)),
        })
    }

    /// Maximum number of concurrently running units
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of idle workers right now
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Units submitted and not yet finished
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Total units ever accepted by this pool
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Whether `shutdown` has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Spawn one unit into `set`
    ///
    /// The unit starts once a worker is free. Returns the task id so the
    /// caller can map a panicked task back to its batch slot.
    pub(crate) fn submit<T, F>(
        &self,
        set: &mut JoinSet<Result<T, FanOutError>>,
        unit: F,
    ) -> Result<Id, FanOutError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, FanOutError>> + Send + 'static,
    {
        // Count first so a concurrent shutdown either sees this unit or we see it closed
        self.in_flight.send_modify(|n| *n += 1);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        if self.is_closed() {
            return Err(FanOutError::PoolClosed);
        }

        let permits = Arc::clone(&self.permits);
        self.submitted.fetch_add(1, Ordering::Relaxed);

        let handle = set.spawn_on(
            async move {
                let _guard = guard;
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| FanOutError::PoolClosed)?;
                unit.await
            },
            &self.runtime,
        );

        Ok(handle.id())
    }

    /// Stop accepting work and wait for in-flight units to finish
    ///
    /// Units already submitted, running or still queued for a worker, run to
    /// completion before this returns. Later submissions fail with
    /// `PoolClosed`. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("worker pool already shut down");
            return;
        }

        info!(in_flight = self.in_flight(), "draining worker pool");

        let mut in_flight = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = in_flight.wait_for(|&n| n == 0).await;
        self.permits.close();

        info!(submitted = self.submitted(), "worker pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_new_requires_runtime() {
        let err = WorkerPool::new(2).unwrap_err();
        assert!(matches!(err, FanOutError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_new_rejects_zero_workers() {
        let err = WorkerPool::new(0).unwrap_err();
        assert!(matches!(err, FanOutError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_submit_runs_unit() {
        let pool = WorkerPool::new(2).unwrap();
        let mut set = JoinSet::new();

        pool.submit(&mut set, async { Ok(7) }).unwrap();

        let value = set.join_next().await.unwrap().unwrap().unwrap();
        assert_eq!(value, 7);
        assert_eq!(pool.submitted(), 1);
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_units() {
        let pool = WorkerPool::new(1).unwrap();
        let finished = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();

        for _ in 0..3 {
            let finished = Arc::clone(&finished);
            pool.submit(&mut set, async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }
        assert_eq!(pool.in_flight(), 3);

        pool.shutdown().await;

        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.is_closed());
        while let Some(joined) = set.join_next().await {
            assert!(joined.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let pool = WorkerPool::new(2).unwrap();
        pool.shutdown().await;
        pool.shutdown().await;

        let mut set: JoinSet<Result<(), FanOutError>> = JoinSet::new();
        let err = pool.submit(&mut set, async { Ok(()) }).unwrap_err();

        assert!(matches!(err, FanOutError::PoolClosed));
        assert_eq!(pool.submitted(), 0);
        assert_eq!(pool.in_flight(), 0);
    }
}
