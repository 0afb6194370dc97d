//! Hostname resolution

use std::net::IpAddr;

use tokio::net::lookup_host;
use tracing::{debug, instrument};

use crate::error::ClusterError;

/// Resolve `hostname` to its first address
///
/// IP literals are returned as-is without a lookup.
///
/// # Errors
/// Returns `UnresolvableHost` when the lookup fails or yields nothing.
#[instrument]
pub async fn resolve_address(hostname: &str) -> Result<IpAddr, ClusterError> {
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return Ok(ip);
    }

    let unresolvable = |reason: String| ClusterError::UnresolvableHost {
        host: hostname.to_string(),
        reason,
    };

    let mut addrs = lookup_host((hostname, 0))
        .await
        .map_err(|e| unresolvable(e.to_string()))?;
    let addr = addrs
        .next()
        .ok_or_else(|| unresolvable("no addresses returned".to_string()))?;

    debug!(ip = %addr.ip(), "resolved");
    Ok(addr.ip())
}
