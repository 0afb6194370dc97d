//! Daemon name to config entity mapping

use std::fmt;

use serde::{Deserialize, Serialize};

/// Daemon types whose config lives under a `client.` entity
const CLIENT_DAEMONS: &[&str] = &["rgw", "rbd-mirror", "nfs", "crash", "iscsi"];

/// Daemon types that are config entities in their own right
const NATIVE_DAEMONS: &[&str] = &["mon", "osd", "mds", "mgr", "client"];

/// Entity name as used in the cluster config database
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfEntity(String);

impl ConfEntity {
    /// Entity name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ConfEntity> for String {
    fn from(entity: ConfEntity) -> Self {
        entity.0
    }
}

/// Map a daemon name such as `rgw.foo` to its config entity
///
/// The daemon type is everything before the first `.`. Unknown types fall
/// back to the `mon` entity.
#[must_use]
pub fn name_to_config_section(name: &str) -> ConfEntity {
    let daemon_type = name.split('.').next().unwrap_or_default();
    if CLIENT_DAEMONS.contains(&daemon_type) {
        ConfEntity(format!("client.{name}"))
    } else if NATIVE_DAEMONS.contains(&daemon_type) {
        ConfEntity(name.to_string())
    } else {
        ConfEntity("mon".to_string())
    }
}
