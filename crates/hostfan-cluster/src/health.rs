//! Cluster health query

use std::fmt;
use std::time::Duration;

use hostfan_exec::traits::RemoteExecutor;
use serde::Deserialize;
use tracing::{debug, error, instrument};

use crate::error::ClusterError;

/// Management command reporting cluster health as JSON
pub const DEFAULT_HEALTH_COMMAND: &str = "ceph health --format json";

/// Overall cluster health
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// `HEALTH_OK`
    Ok,
    /// `HEALTH_WARN`
    Warn,
    /// `HEALTH_ERR`
    Err,
    /// Any other status token, kept verbatim
    Other(String),
}

impl HealthStatus {
    /// Classify a raw status token
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token {
            "HEALTH_OK" => HealthStatus::Ok,
            "HEALTH_WARN" => HealthStatus::Warn,
            "HEALTH_ERR" => HealthStatus::Err,
            other => HealthStatus::Other(other.to_string()),
        }
    }

    /// Whether the cluster reports no problems
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, HealthStatus::Ok)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Ok => f.write_str("HEALTH_OK"),
            HealthStatus::Warn => f.write_str("HEALTH_WARN"),
            HealthStatus::Err => f.write_str("HEALTH_ERR"),
            HealthStatus::Other(token) => f.write_str(token),
        }
    }
}

#[derive(Deserialize)]
struct HealthReply {
    status: String,
}

/// Parse the JSON printed by the health command
///
/// # Errors
/// Returns `HealthParse` if `output` is not JSON or has no string `status`.
pub fn parse_health(output: &str) -> Result<HealthStatus, ClusterError> {
    let reply: HealthReply = serde_json::from_str(output).map_err(|e| {
        error!(output = %output, error = %e, "failed to parse health status");
        ClusterError::HealthParse(e.to_string())
    })?;
    Ok(HealthStatus::from_token(&reply.status))
}

/// Run `command` through `executor` and parse the reported health
///
/// # Errors
/// `Exec` if the command cannot run or times out, `CommandFailed` on a
/// non-zero exit, `HealthParse` for unexpected output.
#[instrument(skip(executor), fields(executor = executor.executor_type()))]
pub async fn query_cluster_health(
    executor: &dyn RemoteExecutor,
    command: &str,
    timeout: Duration,
) -> Result<HealthStatus, ClusterError> {
    let result = executor.run_with_timeout(command, timeout).await?;
    if !result.success() {
        return Err(ClusterError::CommandFailed {
            status: result.status,
            stderr: result.stderr.trim().to_string(),
        });
    }

    let status = parse_health(&result.stdout)?;
    debug!(%status, "cluster health");
    Ok(status)
}
