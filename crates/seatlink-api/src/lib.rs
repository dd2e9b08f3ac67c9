//! Protocol types for seatlink IPC
//!
//! This crate defines what travels inside frames between seatlinkd and
//! its clients:
//! - Opcodes identifying each frame kind
//! - Commands (requests from clients) and responses
//! - Events (daemon -> subscribed clients)

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;

/// Frame carrying a JSON [`Request`]
pub const OP_REQUEST: u16 = 1;
/// Frame carrying a JSON [`Response`]
pub const OP_RESPONSE: u16 = 2;
/// Frame carrying a JSON [`Event`]
pub const OP_EVENT: u16 = 3;

/// Size of the frame header: `opcode: u16` then `size: u16`, native byte order
pub const HEADER_SIZE: usize = 4;
/// Largest payload a frame header can describe
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Longest [`ErrorInfo`] message, in bytes
pub const MAX_ERROR_MESSAGE_LEN: usize = 64;

/// Smallest connection buffer that can carry any error response frame
pub const MIN_BUFFER_SIZE: usize = 256;
