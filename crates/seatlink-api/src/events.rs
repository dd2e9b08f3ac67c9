//! Event types for seatlinkd -> client streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use seatlink_util::ClientId;

use crate::{ClientRole, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: Local::now(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ClientConnected { client_id: ClientId, role: ClientRole },
    ClientDisconnected { client_id: ClientId },
    /// The daemon is going away; the connection will be closed
    Shutdown,
}
