//! Frame codec on top of a [`Connection`]
//!
//! Each frame is a header (`opcode: u16`, `size: u16`, native byte order)
//! followed by `size` payload bytes. Frames are queued with a single `put`
//! so they are never half-sent, and decoding backs off with `restore` when
//! the payload has not fully arrived.

use seatlink_api::{HEADER_SIZE, MAX_PAYLOAD_SIZE};
use seatlink_conn::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::os::fd::AsFd;

use crate::{IpcError, IpcResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: u16, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    /// Build a frame whose payload is `message` as JSON
    pub fn from_message<T: Serialize>(opcode: u16, message: &T) -> IpcResult<Self> {
        Ok(Self::new(opcode, serde_json::to_vec(message)?))
    }

    /// Decode the JSON payload
    pub fn decode<T: DeserializeOwned>(&self) -> IpcResult<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Header plus payload
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Largest frame a connection with `capacity`-byte queues can carry
pub fn max_frame_len(capacity: usize) -> usize {
    capacity.min(HEADER_SIZE + MAX_PAYLOAD_SIZE)
}

/// Queue `frame` on `conn`, all of it or nothing.
///
/// Fails with [`IpcError::FrameTooLarge`] if the frame can never fit, and
/// with a transient [`ConnectionError::Full`](seatlink_conn::ConnectionError)
/// if it only needs the outbound queue to be flushed first.
pub fn write_frame<F: AsFd>(conn: &mut Connection<F>, frame: &Frame) -> IpcResult<()> {
    let max = max_frame_len(conn.capacity());
    if frame.encoded_len() > max {
        return Err(IpcError::FrameTooLarge {
            size: frame.encoded_len(),
            max,
        });
    }

    let mut buf = Vec::with_capacity(frame.encoded_len());
    buf.extend_from_slice(&frame.opcode.to_ne_bytes());
    buf.extend_from_slice(&(frame.payload.len() as u16).to_ne_bytes());
    buf.extend_from_slice(&frame.payload);

    conn.put(&buf)?;
    Ok(())
}

/// Take the next complete frame from `conn`'s inbound queue.
///
/// Returns `Ok(None)` and leaves the queue untouched if the frame has not
/// fully arrived. A header announcing a frame larger than the queue could
/// ever hold is reported as [`IpcError::FrameTooLarge`].
pub fn read_frame<F: AsFd>(conn: &mut Connection<F>) -> IpcResult<Option<Frame>> {
    if conn.pending() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = [0u8; HEADER_SIZE];
    conn.get_into(&mut header)?;
    let opcode = u16::from_ne_bytes([header[0], header[1]]);
    let size = u16::from_ne_bytes([header[2], header[3]]) as usize;

    let max = max_frame_len(conn.capacity());
    if HEADER_SIZE + size > max {
        conn.restore(HEADER_SIZE)?;
        return Err(IpcError::FrameTooLarge {
            size: HEADER_SIZE + size,
            max,
        });
    }

    if conn.pending() < size {
        conn.restore(HEADER_SIZE)?;
        return Ok(None);
    }

    let payload = conn.get(size)?;
    Ok(Some(Frame { opcode, payload }))
}
