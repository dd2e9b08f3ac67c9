//! Validated daemon settings

use seatlink_conn::CONNECTION_BUFFER_SIZE;
use seatlink_util::socket_path_without_env;
use std::path::PathBuf;

use crate::schema::{RawConfig, RawDaemonConfig};

pub const DEFAULT_MAX_CLIENTS: usize = 32;
pub const DEFAULT_RATE_LIMIT_PER_SECOND: u32 = 30;

/// Validated configuration ready for use by the daemon
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub daemon: DaemonConfig,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            daemon: DaemonConfig::from_raw(raw.daemon),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    /// Capacity of each per-connection queue
    pub buffer_size: usize,
    pub max_clients: usize,
    pub rate_limit_per_second: u32,
}

impl DaemonConfig {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(socket_path_without_env),
            buffer_size: raw.buffer_size.unwrap_or(CONNECTION_BUFFER_SIZE),
            max_clients: raw.max_clients.unwrap_or(DEFAULT_MAX_CLIENTS),
            rate_limit_per_second: raw
                .rate_limit_per_second
                .unwrap_or(DEFAULT_RATE_LIMIT_PER_SECOND),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_raw(RawDaemonConfig::default())
    }
}
