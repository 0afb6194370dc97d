//! hostfan-core: Host fan-out executor
//!
//! Applies one operation to every managed host concurrently on a bounded
//! worker pool, logs per-host failures with the whole batch for context, and
//! returns results in input order.
//!
//! The [`Orchestrator`] owns the pool and is passed explicitly; see
//! [`adapter`] for how work items map onto operation arguments and
//! [`registry`] for invoking operations by name with JSON arguments.

pub mod adapter;
pub mod config;
pub mod error;
pub mod fanout;
pub mod owner;
pub mod pool;
pub mod registry;

pub use adapter::{BoundHostFn, HostFn, Scalar, WorkItem};
pub use config::{HostConfig, PoolConfig};
pub use error::{BoxError, FanOutError};
pub use fanout::{
    BatchFuture, BatchReport, dispatch, dispatch_bound, dispatch_bound_settled, dispatch_settled,
};
pub use owner::{Orchestrator, OrchestratorArgs, PoolOwner};
pub use pool::WorkerPool;
pub use registry::{JsonArgs, OperationInfo, OperationRegistry, normalize_call};
