//! Fan-out dispatcher
//!
//! Submits one unit per work item to the owner's [`WorkerPool`], waits for
//! every unit and reassembles results in input order. Two failure policies
//! are offered:
//!
//! - [`dispatch`] / [`dispatch_bound`]: fail fast. Every unit still runs to
//!   completion, then the first failure observed (in completion order) is
//!   returned. Other hosts may already have been acted on.
//! - [`dispatch_settled`] / [`dispatch_bound_settled`]: report every slot in a
//!   [`BatchReport`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{Instrument, debug, error, info_span, warn};

use crate::adapter::{BoundHostFn, HostFn, UnitFuture, WorkItem};
use crate::error::FanOutError;
use crate::owner::PoolOwner;
use crate::pool::WorkerPool;

/// Future of a whole batch
///
/// Boxed so a dispatch can be handed to `tokio::spawn` from any caller.
pub type BatchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FanOutError>> + Send + 'a>>;

/// Per-slot outcome of a batch, in input order
#[derive(Debug)]
pub struct BatchReport<T> {
    /// Name of the fanned-out operation
    pub operation: String,
    /// When the batch was submitted
    pub started_at: DateTime<Utc>,
    /// Time until the last unit finished
    pub elapsed: Duration,
    /// Result of item `i` at position `i`
    pub outcomes: Vec<Result<T, FanOutError>>,
}

impl<T> BatchReport<T> {
    fn empty(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            outcomes: Vec::new(),
        }
    }

    /// Number of items in the batch
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the batch had no items
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of items that succeeded
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    /// Number of items that failed
    #[must_use]
    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Failures with their batch index
    pub fn failures(&self) -> impl Iterator<Item = (usize, &FanOutError)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().err().map(|e| (i, e)))
    }

    /// Collapse to all-or-nothing, returning the lowest-index failure
    ///
    /// # Errors
    /// Returns the failure of the first failed slot.
    pub fn into_result(self) -> Result<Vec<T>, FanOutError> {
        self.outcomes.into_iter().collect()
    }
}

/// Run a free operation over `items`, failing fast
///
/// # Errors
/// `NotInitialized` if the owner has no pool yet (only checked for non-empty
/// batches), `PoolClosed` after shutdown, otherwise the first unit failure.
pub fn dispatch<'a, O, I, F>(
    owner: &'a O,
    operation: &'a str,
    items: Vec<I>,
    op: F,
) -> BatchFuture<'a, Vec<F::Output>>
where
    O: PoolOwner + Sync + ?Sized,
    I: WorkItem + Debug,
    F: HostFn<I::Args>,
{
    Box::pin(async move {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let pool = owner.worker_pool()?;
        let op = Arc::new(op);
        run_batch(pool, operation, items, move |args: I::Args| {
            HostFn::call(&*op, args)
        })
        .await
        .into_fail_fast()
    })
}

/// Run an operation that needs the owner over `items`, failing fast
///
/// # Errors
/// Same as [`dispatch`].
pub fn dispatch_bound<'a, O, I, F>(
    owner: &'a Arc<O>,
    operation: &'a str,
    items: Vec<I>,
    op: F,
) -> BatchFuture<'a, Vec<F::Output>>
where
    O: PoolOwner + Send + Sync + 'static,
    I: WorkItem + Debug,
    F: BoundHostFn<O, I::Args>,
{
    Box::pin(async move {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let pool = owner.worker_pool()?;
        let owner = Arc::clone(owner);
        let op = Arc::new(op);
        run_batch(pool, operation, items, move |args: I::Args| {
            BoundHostFn::call(&*op, Arc::clone(&owner), args)
        })
        .await
        .into_fail_fast()
    })
}

/// Run a free operation over `items`, reporting every slot
///
/// # Errors
/// Only errors that prevent submission: `NotInitialized`, `PoolClosed`.
pub fn dispatch_settled<'a, O, I, F>(
    owner: &'a O,
    operation: &'a str,
    items: Vec<I>,
    op: F,
) -> BatchFuture<'a, BatchReport<F::Output>>
where
    O: PoolOwner + Sync + ?Sized,
    I: WorkItem + Debug,
    F: HostFn<I::Args>,
{
    Box::pin(async move {
        if items.is_empty() {
            return Ok(BatchReport::empty(operation));
        }
        let pool = owner.worker_pool()?;
        let op = Arc::new(op);
        run_batch(pool, operation, items, move |args: I::Args| {
            HostFn::call(&*op, args)
        })
        .await
        .into_report()
    })
}

/// Run an operation that needs the owner over `items`, reporting every slot
///
/// # Errors
/// Same as [`dispatch_settled`].
pub fn dispatch_bound_settled<'a, O, I, F>(
    owner: &'a Arc<O>,
    operation: &'a str,
    items: Vec<I>,
    op: F,
) -> BatchFuture<'a, BatchReport<F::Output>>
where
    O: PoolOwner + Send + Sync + 'static,
    I: WorkItem + Debug,
    F: BoundHostFn<O, I::Args>,
{
    Box::pin(async move {
        if items.is_empty() {
            return Ok(BatchReport::empty(operation));
        }
        let pool = owner.worker_pool()?;
        let owner = Arc::clone(owner);
        let op = Arc::new(op);
        run_batch(pool, operation, items, move |args: I::Args| {
            BoundHostFn::call(&*op, Arc::clone(&owner), args)
        })
        .await
        .into_report()
    })
}

/// Units of one batch; detaches them on drop so a dropped caller does not
/// cancel work already handed to the pool
struct Batch<T: 'static> {
    set: JoinSet<Result<T, FanOutError>>,
    slots: HashMap<Id, usize>,
}

impl<T: 'static> Drop for Batch<T> {
    fn drop(&mut self) {
        self.set.detach_all();
    }
}

/// Everything observed while running a batch
struct Collected<T> {
    operation: String,
    started_at: DateTime<Utc>,
    elapsed: Duration,
    outcomes: Vec<Result<T, FanOutError>>,
    /// First failure in completion order
    first_failure: Option<FanOutError>,
    /// Submission error, if the pool refused part of the batch
    refused: Option<FanOutError>,
}

impl<T> Collected<T> {
    fn into_fail_fast(self) -> Result<Vec<T>, FanOutError> {
        if let Some(err) = self.refused.or(self.first_failure) {
            return Err(err);
        }
        self.outcomes.into_iter().collect()
    }

    fn into_report(self) -> Result<BatchReport<T>, FanOutError> {
        if let Some(err) = self.refused {
            return Err(err);
        }
        Ok(BatchReport {
            operation: self.operation,
            started_at: self.started_at,
            elapsed: self.elapsed,
            outcomes: self.outcomes,
        })
    }
}

async fn run_batch<I, T, C>(
    pool: &WorkerPool,
    operation: &str,
    items: Vec<I>,
    call: C,
) -> Collected<T>
where
    I: WorkItem + Debug,
    T: Send + 'static,
    C: Fn(I::Args) -> UnitFuture<T> + Send + Sync + 'static,
{
    let span = info_span!("fan_out", operation = %operation, items = items.len());
    let submitted = span.in_scope(|| submit_batch(pool, operation, items, call));
    collect(operation, submitted).instrument(span).await
}

/// What `submit_batch` hands over to `collect`
struct Submitted<T: 'static> {
    batch: Batch<T>,
    total: usize,
    rendered: Arc<str>,
    started_at: DateTime<Utc>,
    clock: Instant,
    refused: Option<FanOutError>,
}

/// Spawn one unit per item; the operation itself is only called inside its
/// unit, once a worker is free
fn submit_batch<I, T, C>(
    pool: &WorkerPool,
    operation: &str,
    items: Vec<I>,
    call: C,
) -> Submitted<T>
where
    I: WorkItem + Debug,
    T: Send + 'static,
    C: Fn(I::Args) -> UnitFuture<T> + Send + Sync + 'static,
{
    let started_at = Utc::now();
    let clock = Instant::now();
    let total = items.len();

    // Rendered once and shared: every failure log names the whole batch
    let rendered: Arc<str> = Arc::from(format!("{items:?}"));
    let name: Arc<str> = Arc::from(operation);

    let mut batch = Batch {
        set: JoinSet::new(),
        slots: HashMap::with_capacity(total),
    };
    let mut refused = None;

    let call = Arc::new(call);

    for (index, item) in items.into_iter().enumerate() {
        let args = item.into_args();
        let call = Arc::clone(&call);
        let name = Arc::clone(&name);
        let rendered = Arc::clone(&rendered);
        let wrapped = async move {
            (*call)(args).await.map_err(|source| {
                error!(
                    operation = %name,
                    index,
                    batch = %rendered,
                    error = %source,
                    "executing {name}({rendered}) failed"
                );
                FanOutError::host_operation(&name, index, source)
            })
        }
        .instrument(info_span!("unit", operation = %operation, index));

        match pool.submit(&mut batch.set, wrapped) {
            Ok(id) => {
                batch.slots.insert(id, index);
            }
            Err(err) => {
                // Pool closed mid-batch; whatever was submitted still runs
                error!(operation, index, error = %err, "batch submission refused");
                refused = Some(err);
                break;
            }
        }
    }

    debug!(submitted = batch.slots.len(), "batch submitted");

    Submitted {
        batch,
        total,
        rendered,
        started_at,
        clock,
        refused,
    }
}

async fn collect<T: Send + 'static>(operation: &str, submitted: Submitted<T>) -> Collected<T> {
    let Submitted {
        mut batch,
        total,
        rendered,
        started_at,
        clock,
        refused,
    } = submitted;

    let mut outcomes: Vec<Option<Result<T, FanOutError>>> = (0..total).map(|_| None).collect();
    let mut first_failure = None;

    while let Some(joined) = batch.set.join_next_with_id().await {
        let (slot, outcome) = match joined {
            Ok((id, outcome)) => (batch.slots[&id], outcome),
            Err(join_err) => {
                let slot = batch.slots[&join_err.id()];
                (slot, Err(unit_aborted(operation, slot, &rendered, join_err)))
            }
        };
        if let (Err(err), None) = (&outcome, &first_failure) {
            first_failure = Some(err.clone());
        }
        outcomes[slot] = Some(outcome);
    }

    let elapsed = clock.elapsed();
    debug!(?elapsed, failed = first_failure.is_some(), "batch finished");

    Collected {
        operation: operation.to_string(),
        started_at,
        elapsed,
        // Slots left empty were never submitted
        outcomes: outcomes
            .into_iter()
            .map(|o| o.unwrap_or(Err(FanOutError::PoolClosed)))
            .collect(),
        first_failure,
        refused,
    }
}

fn unit_aborted(operation: &str, index: usize, rendered: &str, join_err: JoinError) -> FanOutError {
    if !join_err.is_panic() {
        warn!(operation, index, batch = %rendered, "executing {operation}({rendered}) was cancelled");
        return FanOutError::UnitCancelled {
            operation: operation.to_string(),
            index,
        };
    }

    let payload = join_err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    error!(
        operation,
        index,
        batch = %rendered,
        panic = %message,
        "executing {operation}({rendered}) panicked"
    );

    FanOutError::UnitPanicked {
        operation: operation.to_string(),
        index,
        message,
    }
}
