//! Orchestrator context
//!
//! The single long-lived owner of the worker pool, the managed-host registry
//! and the management-plane executor. It is created once at process start and
//! handed to callers as `Arc<Orchestrator>`; operations that need it receive
//! it explicitly as their first argument.

use std::fmt::Debug;
use std::sync::{Arc, OnceLock, RwLock};

use hostfan_exec::local::LocalExecutor;
use hostfan_exec::traits::RemoteExecutor;
use tracing::{info, warn};

use crate::adapter::{BoundHostFn, HostFn, WorkItem};
use crate::config::{HostConfig, PoolConfig};
use crate::error::FanOutError;
use crate::fanout::{self, BatchFuture, BatchReport};
use crate::pool::WorkerPool;

/// Anything that can lend the dispatcher a worker pool
pub trait PoolOwner {
    /// The pool, once it has been created
    ///
    /// # Errors
    /// Returns `NotInitialized` before the pool exists.
    fn worker_pool(&self) -> Result<&WorkerPool, FanOutError>;
}

/// Arguments for constructing an [`Orchestrator`]
pub struct OrchestratorArgs {
    /// Worker pool sizing
    pub pool: PoolConfig,
    /// Executor for management-plane commands
    pub executor: Arc<dyn RemoteExecutor>,
    /// Initially managed hosts, in fan-out order
    pub hosts: Vec<HostConfig>,
}

impl Default for OrchestratorArgs {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            executor: Arc::new(LocalExecutor::new()),
            hosts: Vec::new(),
        }
    }
}

/// Owner of the shared worker pool and cluster state
pub struct Orchestrator {
    pool_config: PoolConfig,
    pool: OnceLock<WorkerPool>,
    executor: Arc<dyn RemoteExecutor>,
    /// Registration order is fan-out order
    hosts: RwLock<Vec<HostConfig>>,
}

impl Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pool_config", &self.pool_config)
            .field("started", &self.is_started())
            .field("executor", &self.executor.executor_type())
            .field("hosts", &self.host_count())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Build the context; the worker pool is created later by [`start`](Self::start)
    ///
    /// # Errors
    /// Returns `HostAlreadyExists` if `args.hosts` repeats a name.
    pub fn new(args: OrchestratorArgs) -> Result<Arc<Self>, FanOutError> {
        let orchestrator = Self {
            pool_config: args.pool,
            pool: OnceLock::new(),
            executor: args.executor,
            hosts: RwLock::new(Vec::with_capacity(args.hosts.len())),
        };
        for host in args.hosts {
            orchestrator.register_host(host)?;
        }
        Ok(Arc::new(orchestrator))
    }

    /// Create the worker pool
    ///
    /// Must run inside the tokio runtime the pool should use.
    ///
    /// # Errors
    /// `AlreadyStarted` on a second call, `ConfigError` for an invalid size.
    pub fn start(&self) -> Result<(), FanOutError> {
        if self.pool.get().is_some() {
            return Err(FanOutError::AlreadyStarted);
        }
        let pool = WorkerPool::new(self.pool_config.workers)?;
        self.pool
            .set(pool)
            .map_err(|_| FanOutError::AlreadyStarted)?;
        info!(
            workers = self.pool_config.workers,
            hosts = self.host_count(),
            "orchestrator started"
        );
        Ok(())
    }

    /// Drain and close the worker pool
    pub async fn shutdown(&self) {
        match self.pool.get() {
            Some(pool) => pool.shutdown().await,
            None => warn!("shutdown before start"),
        }
    }

    /// Whether [`start`](Self::start) has created the pool
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.pool.get().is_some()
    }

    /// Executor for management-plane commands
    #[must_use]
    pub fn executor(&self) -> &Arc<dyn RemoteExecutor> {
        &self.executor
    }

    /// Add a managed host at the end of the fan-out order
    ///
    /// # Errors
    /// Returns `HostAlreadyExists` if the name is taken.
    pub fn register_host(&self, host: HostConfig) -> Result<(), FanOutError> {
        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());
        if hosts.iter().any(|h| h.name == host.name) {
            return Err(FanOutError::HostAlreadyExists(host.name));
        }
        info!(host = %host.name, "registered host");
        hosts.push(host);
        Ok(())
    }

    /// Remove a managed host
    ///
    /// # Errors
    /// Returns `HostNotFound` if no host has that name.
    pub fn unregister_host(&self, name: &str) -> Result<HostConfig, FanOutError> {
        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());
        let pos = hosts
            .iter()
            .position(|h| h.name == name)
            .ok_or_else(|| FanOutError::HostNotFound(name.to_string()))?;
        info!(host = %name, "unregistered host");
        Ok(hosts.remove(pos))
    }

    /// Look up one managed host
    ///
    /// # Errors
    /// Returns `HostNotFound` if no host has that name.
    pub fn host(&self, name: &str) -> Result<HostConfig, FanOutError> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|h| h.name == name)
            .cloned()
            .ok_or_else(|| FanOutError::HostNotFound(name.to_string()))
    }

    /// Snapshot of managed hosts in fan-out order
    #[must_use]
    pub fn hosts(&self) -> Vec<HostConfig> {
        self.hosts.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of managed hosts
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.hosts.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Fan a free operation out over `items`, failing fast
    ///
    /// # Errors
    /// See [`fanout::dispatch`].
    pub fn fan_out<'a, I, F>(
        &'a self,
        operation: &'a str,
        items: Vec<I>,
        op: F,
    ) -> BatchFuture<'a, Vec<F::Output>>
    where
        I: WorkItem + Debug,
        F: HostFn<I::Args>,
    {
        fanout::dispatch(self, operation, items, op)
    }

    /// Fan an operation that takes the orchestrator out over `items`, failing fast
    ///
    /// # Errors
    /// See [`fanout::dispatch_bound`].
    pub fn fan_out_bound<'a, I, F>(
        self: &'a Arc<Self>,
        operation: &'a str,
        items: Vec<I>,
        op: F,
    ) -> BatchFuture<'a, Vec<F::Output>>
    where
        I: WorkItem + Debug,
        F: BoundHostFn<Self, I::Args>,
    {
        fanout::dispatch_bound(self, operation, items, op)
    }

    /// Fan a free operation out over `items`, reporting every slot
    ///
    /// # Errors
    /// See [`fanout::dispatch_settled`].
    pub fn fan_out_settled<'a, I, F>(
        &'a self,
        operation: &'a str,
        items: Vec<I>,
        op: F,
    ) -> BatchFuture<'a, BatchReport<F::Output>>
    where
        I: WorkItem + Debug,
        F: HostFn<I::Args>,
    {
        fanout::dispatch_settled(self, operation, items, op)
    }

    /// Fan an operation that takes the orchestrator out over `items`,
    /// reporting every slot
    ///
    /// # Errors
    /// See [`fanout::dispatch_bound_settled`].
    pub fn fan_out_bound_settled<'a, I, F>(
        self: &'a Arc<Self>,
        operation: &'a str,
        items: Vec<I>,
        op: F,
    ) -> BatchFuture<'a, BatchReport<F::Output>>
    where
        I: WorkItem + Debug,
        F: BoundHostFn<Self, I::Args>,
    {
        fanout::dispatch_bound_settled(self, operation, items, op)
    }
}

impl PoolOwner for Orchestrator {
    fn worker_pool(&self) -> Result<&WorkerPool, FanOutError> {
        self.pool.get().ok_or(FanOutError::NotInitialized)
    }
}
