//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub daemon: RawDaemonConfig,
}

/// Daemon-level settings, all optional
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Capacity of each per-connection queue, in bytes
    pub buffer_size: Option<usize>,

    /// Connections accepted at the same time
    pub max_clients: Option<usize>,

    /// Requests allowed per client per second
    pub rate_limit_per_second: Option<u32>,
}
