//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use hostfan_cluster::DEFAULT_HEALTH_COMMAND;
use hostfan_core::{HostConfig, PoolConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level configuration for the hostfan daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Worker pool sizing
    #[serde(default)]
    pub pool: PoolConfig,
    /// Management-plane commands
    #[serde(default)]
    pub management: ManagementConfig,
    /// Managed hosts, in fan-out order
    #[serde(default)]
    pub host: Vec<HostConfig>,
    /// Named fan-out tasks
    #[serde(default)]
    pub task: Vec<TaskConfig>,
}

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log line format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Management-plane command settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementConfig {
    /// Command printing cluster health as JSON
    #[serde(default = "default_health_command")]
    pub health_command: String,
    /// Deadline for each management or per-host command, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            health_command: default_health_command(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ManagementConfig {
    /// Command deadline
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_health_command() -> String {
    DEFAULT_HEALTH_COMMAND.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// A named invocation of a registered operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task name used on the command line
    pub name: String,
    /// Registered operation to invoke
    pub operation: String,
    /// Positional arguments; normally a single array, the batch
    #[serde(default)]
    pub args: Vec<Value>,
    /// Report every host instead of stopping at the first failure
    #[serde(default)]
    pub settled: bool,
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not a valid configuration
    pub fn parse(content: &str) -> eyre::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be loaded
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var("HOSTFAN_CONFIG") {
            return Self::load(Path::new(&path));
        }

        let mut paths = vec![
            PathBuf::from("hostfan.toml"),
            PathBuf::from("/etc/hostfan/hostfan.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("hostfan/hostfan.toml"));
        }

        for path in paths {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::warn!("no config file found, using defaults");
        Ok(Config::default())
    }

    /// Look up a task by name
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.task.iter().find(|t| t.name == name)
    }
}
