//! Shared types for the seatlink API

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Snapshot returned by `GetStatus`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub api_version: u32,
    pub started_at: DateTime<Local>,
    pub uptime_secs: u64,
    pub client_count: usize,
    /// Capacity of each per-connection queue
    pub buffer_size: usize,
}

/// Client role, decided from the peer credentials at accept time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// root, or the same user the daemon runs as
    Admin,
    User,
}

/// What the daemon knows about a connected client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub role: ClientRole,
    pub uid: Option<u32>,
    pub pid: Option<i32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            role,
            uid: None,
            pid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }
}
