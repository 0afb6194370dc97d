//! hostfan-cluster: Cluster collaborators
//!
//! Small lookups the fan-out operations call into: daemon name to config
//! section, hostname resolution, cluster health and image reference checks.

pub mod error;
pub mod health;
pub mod image;
pub mod naming;
pub mod net;

pub use error::ClusterError;
pub use health::{DEFAULT_HEALTH_COMMAND, HealthStatus, parse_health, query_cluster_health};
pub use image::is_repo_digest;
pub use naming::{ConfEntity, name_to_config_section};
pub use net::resolve_address;
