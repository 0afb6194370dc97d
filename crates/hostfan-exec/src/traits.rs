//! Remote executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;

/// Runs shell commands somewhere on behalf of a host operation
///
/// A non-zero exit status is not an error at this level; callers inspect
/// [`CommandResult::success`].
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command to completion
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a command, failing with [`ExecError::Timeout`] once `timeout` elapses
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Short name for logs
    fn executor_type(&self) -> &'static str;
}
