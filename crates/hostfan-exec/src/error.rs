//! Error types for hostfan-exec

use std::time::Duration;

use thiserror::Error;

/// Errors raised while running a command
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Process could not be started
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error while collecting output
    #[error("I/O error: {0}")]
    IoError(String),

    /// Command exited non-zero where success was required
    #[error("command `{command}` exited with {status}: {stderr}")]
    CommandFailed {
        /// Command line that was run
        command: String,
        /// Exit status code
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Command did not finish in time
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Deadline that was exceeded
        timeout: Duration,
    },
}

impl ExecError {
    /// Whether the failure came from the deadline rather than the command itself
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecError::Timeout { .. })
    }
}
