//! Error types for hostfan-cluster

use hostfan_exec::error::ExecError;
use thiserror::Error;

/// Errors raised by cluster collaborators
#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    /// Hostname did not resolve to any address
    #[error("cannot resolve ip for host {host}: {reason}")]
    UnresolvableHost {
        /// Name that was looked up
        host: String,
        /// Resolver error
        reason: String,
    },

    /// Health output was not the expected JSON
    #[error("failed to parse health status: {0}")]
    HealthParse(String),

    /// Management command exited non-zero
    #[error("command failed: {status} - {stderr}")]
    CommandFailed {
        /// Exit status
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Command could not be run at all
    #[error("execution error: {0}")]
    Exec(#[from] ExecError),
}
