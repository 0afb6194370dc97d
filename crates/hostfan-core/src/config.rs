//! Configuration types for managed hosts and the worker pool

use serde::{Deserialize, Serialize};

/// Configuration for a single managed host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Unique hostname identifier
    pub name: String,
    /// Address used to reach the host; falls back to `name` when empty
    #[serde(default)]
    pub addr: String,
    /// Labels for filtering and grouping
    #[serde(default)]
    pub labels: Vec<String>,
}

impl HostConfig {
    /// Host with no explicit address or labels
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: String::new(),
            labels: Vec::new(),
        }
    }

    /// Set the connection address
    #[must_use]
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Add a label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Address to connect to
    #[must_use]
    pub fn address(&self) -> &str {
        if self.addr.is_empty() {
            &self.name
        } else {
            &self.addr
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of host operations running at once
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    10
}
