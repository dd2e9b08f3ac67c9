//! IPC layer for seatlinkd
//!
//! Provides:
//! - Length-prefixed frame codec over a buffered [`seatlink_conn::Connection`]
//! - Unix domain socket server driven by tokio readiness events
//! - Client connection and event stream
//! - Peer UID authentication

mod client;
mod frame;
mod server;
mod stream;

pub use client::*;
pub use frame::*;
pub use server::*;
pub use stream::*;

use seatlink_conn::ConnectionError;
use thiserror::Error;

/// IPC errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    Connection(ConnectionError),

    #[error("Frame too large: {size} bytes exceeds limit {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Unexpected opcode: {0}")]
    UnexpectedOpcode(u16),

    #[error("Server error: {0}")]
    ServerError(String),
}

impl From<ConnectionError> for IpcError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Closed => Self::ConnectionClosed,
            other => Self::Connection(other),
        }
    }
}

pub type IpcResult<T> = Result<T, IpcError>;
