//! Error types for the connection layer

use std::io;
use thiserror::Error;

/// Errors returned by [`ByteQueue`](crate::ByteQueue) and
/// [`Connection`](crate::Connection) operations.
///
/// `Full`, `Underflow` and `WouldBlock` mean "try again once more room, data
/// or readiness is available". `Closed` and `Io` are fatal to the connection.
/// `InvalidRestore` and `FdOverflow` indicate a caller bug or a misbehaving
/// peer.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Queue full: {requested} bytes requested, {available} available")]
    Full { requested: usize, available: usize },

    #[error("Not enough data: {requested} bytes requested, {pending} pending")]
    Underflow { requested: usize, pending: usize },

    #[error("Operation would block")]
    WouldBlock,

    #[error("Peer closed the connection")]
    Closed,

    #[error("Cannot restore {requested} bytes, only {restorable} restorable")]
    InvalidRestore { requested: usize, restorable: usize },

    #[error("Descriptor queue full ({max} descriptors)")]
    FdOverflow { max: usize },

    #[error("IO error: {0}")]
    Io(io::Error),
}

impl ConnectionError {
    /// Whether the caller should simply retry later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Full { .. } | Self::Underflow { .. } | Self::WouldBlock
        )
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => Self::WouldBlock,
            _ => Self::Io(err),
        }
    }
}

impl From<nix::Error> for ConnectionError {
    fn from(errno: nix::Error) -> Self {
        Self::from(io::Error::from(errno))
    }
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;
