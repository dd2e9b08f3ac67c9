//! Buffered connection layer for seatlink
//!
//! Provides:
//! - A bounded byte queue with all-or-nothing push/pop and rewind
//! - A per-peer connection over a borrowed non-blocking socket
//! - Descriptor passing (`SCM_RIGHTS`) alongside the byte stream
//!
//! Nothing here blocks: every operation either completes or reports
//! [`ConnectionError::WouldBlock`], [`ConnectionError::Full`] or
//! [`ConnectionError::Underflow`] so the caller's event loop can retry later.

mod connection;
mod error;
mod queue;
mod socket;

pub use connection::*;
pub use error::*;
pub use queue::*;
pub use socket::MAX_FDS;
