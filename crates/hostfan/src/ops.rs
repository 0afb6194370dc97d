//! Builtin host operations
//!
//! Typed fan-outs used by the CLI directly, and the same collaborators
//! registered by name so configured tasks can invoke them.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use hostfan_cluster::{
    ClusterError, HealthStatus, is_repo_digest, name_to_config_section, query_cluster_health,
    resolve_address,
};
use hostfan_core::{BoxError, FanOutError, HostConfig, OperationRegistry, Orchestrator};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::ManagementConfig;

/// Placeholder replaced by the host name in `run` command templates
pub const HOST_PLACEHOLDER: &str = "{host}";

/// Resolve every managed host, in registration order
///
/// # Errors
/// Fails with the first host that does not resolve; the underlying
/// `ClusterError::UnresolvableHost` is available through the error source.
pub async fn resolve_hosts(
    orchestrator: &Orchestrator,
) -> Result<Vec<(HostConfig, IpAddr)>, FanOutError> {
    let hosts = orchestrator.hosts();
    let ips = orchestrator
        .fan_out("resolve_address", hosts.clone(), |host: HostConfig| async move {
            resolve_address(host.address()).await
        })
        .await?;
    Ok(hosts.into_iter().zip(ips).collect())
}

/// Query cluster health through the orchestrator's management executor
///
/// # Errors
/// See [`query_cluster_health`].
pub async fn cluster_health(
    orchestrator: &Orchestrator,
    management: &ManagementConfig,
) -> Result<HealthStatus, ClusterError> {
    query_cluster_health(
        orchestrator.executor().as_ref(),
        &management.health_command,
        management.timeout(),
    )
    .await
}

/// Run `template` for `host` through the owner's executor
///
/// # Errors
/// Fails if the command cannot run, times out or exits non-zero.
pub async fn run_on_host(
    owner: Arc<Orchestrator>,
    host: String,
    template: String,
    timeout: Duration,
) -> Result<Value, BoxError> {
    let cmd = template.replace(HOST_PLACEHOLDER, &host);
    let result = match owner.executor().run_with_timeout(&cmd, timeout).await {
        Err(err) if err.is_timeout() => {
            warn!(host = %host, ?timeout, "host did not answer in time");
            return Err(err.into());
        }
        other => other?,
    }
    .ensure_success(&cmd)?;
    info!(host = %host, duration = ?result.duration, "command completed");
    Ok(json!({
        "host": host,
        "stdout": result.stdout.trim(),
    }))
}

/// Registry holding every builtin operation
#[must_use]
pub fn builtin_registry(management: &ManagementConfig) -> OperationRegistry<Orchestrator> {
    let mut registry = OperationRegistry::new();

    registry.register_free("resolve", 1, |args: Vec<Value>| async move {
        let host = string_arg(&args, 0)?;
        let ip = resolve_address(&host).await?;
        Ok(Value::String(ip.to_string()))
    });

    registry.register_free("config-section", 1, |args: Vec<Value>| async move {
        let name = string_arg(&args, 0)?;
        Ok(Value::String(name_to_config_section(&name).into()))
    });

    registry.register_free("is-digest", 1, |args: Vec<Value>| async move {
        let image = string_arg(&args, 0)?;
        Ok(Value::Bool(is_repo_digest(&image)))
    });

    let timeout = management.timeout();
    registry.register_bound(
        "run",
        2,
        move |owner: Arc<Orchestrator>, args: Vec<Value>| async move {
            let host = string_arg(&args, 0)?;
            let template = string_arg(&args, 1)?;
            run_on_host(owner, host, template, timeout).await
        },
    );

    registry
}

fn string_arg(args: &[Value], index: usize) -> Result<String, BoxError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(format!("argument {index} must be a string, got {other}").into()),
        None => Err(format!("missing argument {index}").into()),
    }
}
