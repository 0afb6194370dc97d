//! Core error types for hostfan-core

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by a host operation
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised by the fan-out executor and the orchestrator context
#[derive(Error, Debug, Clone)]
pub enum FanOutError {
    /// Caller violated the calling convention of an operation
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    /// Dispatch attempted before the worker pool was created
    #[error("worker pool not initialized")]
    NotInitialized,

    /// Worker pool created twice
    #[error("worker pool already started")]
    AlreadyStarted,

    /// Worker pool has been shut down
    #[error("worker pool is shut down")]
    PoolClosed,

    /// One host's unit of work failed
    #[error("{operation} failed for item {index}: {source}")]
    HostOperation {
        /// Name of the fanned-out operation
        operation: String,
        /// Position of the failing item in the batch
        index: usize,
        /// Error raised by the operation
        #[source]
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },

    /// One host's unit of work panicked
    #[error("{operation} panicked for item {index}: {message}")]
    UnitPanicked {
        /// Name of the fanned-out operation
        operation: String,
        /// Position of the failing item in the batch
        index: usize,
        /// Panic payload, if it was a string
        message: String,
    },

    /// One host's unit of work was cancelled before it finished
    #[error("{operation} was cancelled for item {index}")]
    UnitCancelled {
        /// Name of the fanned-out operation
        operation: String,
        /// Position of the cancelled item in the batch
        index: usize,
    },

    /// Host not found in registry
    #[error("host not found: {0}")]
    HostNotFound(String),

    /// Host already exists in registry
    #[error("host already exists: {0}")]
    HostAlreadyExists(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl FanOutError {
    pub(crate) fn host_operation(operation: &str, index: usize, source: BoxError) -> Self {
        FanOutError::HostOperation {
            operation: operation.to_string(),
            index,
            source: Arc::from(source),
        }
    }

    /// Index of the batch item that caused the failure, if any
    #[must_use]
    pub fn item_index(&self) -> Option<usize> {
        match self {
            FanOutError::HostOperation { index, .. }
            | FanOutError::UnitPanicked { index, .. }
            | FanOutError::UnitCancelled { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Downcast the operation's own error
    ///
    /// Lets callers recover collaborator errors unchanged from a failed batch.
    #[must_use]
    pub fn operation_error<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            FanOutError::HostOperation { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}
