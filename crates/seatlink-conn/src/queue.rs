//! Bounded byte queue with rewind support
//!
//! Bytes live in a flat, fixed-size buffer between a `head` and a `tail`
//! index. Popping only advances `head`, so the bytes of the most recent pop
//! stay physically in place and can be handed back with [`ByteQueue::unpop`].
//! The buffer is compacted (queued bytes moved to the front) only when an
//! append needs the space.

use std::io::{self, Read, Write};
use tracing::{error, trace};

use crate::{ConnectionError, ConnectionResult};

/// Default capacity of each connection queue
pub const CONNECTION_BUFFER_SIZE: usize = 256;

/// Fixed-capacity FIFO of bytes.
///
/// Every mutating operation is all-or-nothing: on error the queued bytes are
/// exactly what they were before the call.
#[derive(Debug)]
pub struct ByteQueue {
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
    /// Bytes removed by the immediately preceding pop that can still be
    /// handed back
    rewindable: usize,
}

impl ByteQueue {
    /// Create a queue with [`CONNECTION_BUFFER_SIZE`] capacity
    pub fn new() -> Self {
        Self::with_capacity(CONNECTION_BUFFER_SIZE)
    }

    /// Create a queue with a specific capacity
    ///
    /// # Panics
    /// Panics if `capacity == 0`.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ByteQueue capacity must be > 0");
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            rewindable: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of queued bytes
    pub fn len(&self) -> usize {
        self.tail - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Free space left for appends
    pub fn available(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Number of bytes a call to [`unpop`](Self::unpop) may currently restore
    pub fn restorable(&self) -> usize {
        self.rewindable
    }

    /// Queued bytes, oldest first, without consuming them
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.head..self.tail]
    }

    /// Append all of `data`, or nothing if it does not fit.
    pub fn push(&mut self, data: &[u8]) -> ConnectionResult<()> {
        if data.len() > self.available() {
            return Err(ConnectionError::Full {
                requested: data.len(),
                available: self.available(),
            });
        }

        self.rewindable = 0;
        if self.tail + data.len() > self.capacity() {
            self.compact();
        }

        self.buf[self.tail..self.tail + data.len()].copy_from_slice(data);
        self.tail += data.len();
        Ok(())
    }

    /// Remove exactly `len` bytes from the front.
    pub fn pop_exact(&mut self, len: usize) -> ConnectionResult<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.pop_into(&mut out)?;
        Ok(out)
    }

    /// Fill `dst` completely from the front of the queue, or fail without
    /// consuming anything.
    pub fn pop_into(&mut self, dst: &mut [u8]) -> ConnectionResult<()> {
        let len = dst.len();
        if len > self.len() {
            return Err(ConnectionError::Underflow {
                requested: len,
                pending: self.len(),
            });
        }

        dst.copy_from_slice(&self.buf[self.head..self.head + len]);
        self.head += len;
        self.rewindable = len;
        Ok(())
    }

    /// Hand back the last `len` bytes removed by the immediately preceding pop.
    ///
    /// Restoring more than that pop removed is a caller bug: it panics in
    /// debug builds and returns [`ConnectionError::InvalidRestore`] otherwise.
    pub fn unpop(&mut self, len: usize) -> ConnectionResult<()> {
        if len > self.rewindable {
            error!(
                requested = len,
                restorable = self.rewindable,
                "Restore exceeds the preceding pop"
            );
            debug_assert!(
                false,
                "cannot restore {} bytes, only {} restorable",
                len, self.rewindable
            );
            return Err(ConnectionError::InvalidRestore {
                requested: len,
                restorable: self.rewindable,
            });
        }

        self.head -= len;
        self.rewindable -= len;
        Ok(())
    }

    /// Write as much of the queue as one call to `writer` accepts.
    ///
    /// Returns `Ok(0)` without touching the writer when the queue is empty.
    pub fn drain_to<W: Write>(&mut self, writer: &mut W) -> ConnectionResult<usize> {
        if self.is_empty() {
            return Ok(0);
        }

        let written = loop {
            match writer.write(&self.buf[self.head..self.tail]) {
                Ok(0) => return Err(ConnectionError::Io(io::ErrorKind::WriteZero.into())),
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };

        self.head += written;
        self.rewindable = 0;
        if self.is_empty() {
            self.head = 0;
            self.tail = 0;
        }

        trace!(written, remaining = self.len(), "Drained queue");
        Ok(written)
    }

    /// Append as much as one call to `reader` provides.
    ///
    /// Fails with `Full` when there is no free space and with `Closed` when
    /// the reader reports end of stream. A successful fill ends the window in
    /// which the preceding pop can be restored; a failed one keeps it, unless
    /// the bytes of that pop had to be overwritten to make room.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> ConnectionResult<usize> {
        if self.available() == 0 {
            return Err(ConnectionError::Full {
                requested: 1,
                available: 0,
            });
        }

        if self.tail == self.capacity() {
            if self.head == self.rewindable {
                self.rewindable = 0;
            }
            self.compact();
        }

        let read = loop {
            match reader.read(&mut self.buf[self.tail..]) {
                Ok(0) => return Err(ConnectionError::Closed),
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };

        self.tail += read;
        self.rewindable = 0;
        trace!(read, queued = self.len(), "Filled queue");
        Ok(read)
    }

    /// Move the queued bytes, plus any still-restorable ones, to the front.
    fn compact(&mut self) {
        let start = self.head - self.rewindable;
        if start == 0 {
            return;
        }
        self.buf.copy_within(start..self.tail, 0);
        self.tail -= start;
        self.head = self.rewindable;
    }
}

impl Default for ByteQueue {
    fn default() -> Self {
        Self::new()
    }
}
