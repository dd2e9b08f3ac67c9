//! Framed stream: a [`Connection`] driven by tokio readiness events

use seatlink_conn::{Connection, ConnectionError};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use tokio::io::unix::AsyncFd;

use crate::{read_frame, write_frame, Frame, IpcError, IpcResult};

/// A Unix stream socket carrying frames.
///
/// The connection never blocks; this type waits on the reactor whenever the
/// connection reports `WouldBlock`. [`recv`](Self::recv) is cancel safe:
/// bytes already read stay queued for the next call.
pub struct FramedStream {
    io: AsyncFd<Arc<UnixStream>>,
    conn: Connection<Arc<UnixStream>>,
}

impl FramedStream {
    /// Wrap `stream` with `capacity`-byte connection queues.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(stream: UnixStream, capacity: usize) -> IpcResult<Self> {
        stream.set_nonblocking(true)?;
        let stream = Arc::new(stream);

        Ok(Self {
            io: AsyncFd::new(stream.clone())?,
            conn: Connection::with_capacity(stream, capacity),
        })
    }

    pub fn from_tokio(stream: tokio::net::UnixStream, capacity: usize) -> IpcResult<Self> {
        Self::new(stream.into_std()?, capacity)
    }

    pub fn get_ref(&self) -> &UnixStream {
        self.io.get_ref()
    }

    /// Capacity of each connection queue
    pub fn capacity(&self) -> usize {
        self.conn.capacity()
    }

    /// Queue `frame` and write it out.
    pub async fn send(&mut self, frame: &Frame) -> IpcResult<()> {
        loop {
            match write_frame(&mut self.conn, frame) {
                Ok(()) => break,
                Err(IpcError::Connection(ConnectionError::Full { .. })) => self.flush().await?,
                Err(e) => return Err(e),
            }
        }
        self.flush().await
    }

    /// Wait until everything queued has been written to the socket.
    pub async fn flush(&mut self) -> IpcResult<()> {
        while self.conn.outbound_pending() > 0 {
            let mut guard = self.io.writable().await?;
            match self.conn.flush() {
                Ok(_) => {}
                Err(ConnectionError::WouldBlock) => guard.clear_ready(),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Wait for the next complete frame.
    pub async fn recv(&mut self) -> IpcResult<Frame> {
        loop {
            if let Some(frame) = read_frame(&mut self.conn)? {
                return Ok(frame);
            }

            let mut guard = self.io.readable().await?;
            match self.conn.read() {
                Ok(_) => {}
                Err(ConnectionError::WouldBlock) => guard.clear_ready(),
                Err(e) => return Err(e.into()),
            }
        }
    }
}
