//! Per-peer buffered connection

use std::collections::VecDeque;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use tracing::{debug, trace};

use crate::socket::{SocketReader, SocketWriter, MAX_FDS};
use crate::{ByteQueue, ConnectionError, ConnectionResult, CONNECTION_BUFFER_SIZE};

/// Buffered, bounded view of one non-blocking stream socket.
///
/// Outgoing bytes are staged with [`put`](Self::put) and written by
/// [`flush`](Self::flush). Incoming bytes are pulled in by
/// [`read`](Self::read) and consumed with [`get`](Self::get); a `get` can be
/// undone with [`restore`](Self::restore) so a parser can look at a header and
/// back off when the payload has not arrived yet.
///
/// The descriptor is only borrowed: pass `&UnixStream` (or any other
/// [`AsFd`]) and close it yourself. Dropping a `Connection` discards any
/// bytes still queued in either direction.
#[derive(Debug)]
pub struct Connection<F: AsFd> {
    fd: F,
    outbound: ByteQueue,
    inbound: ByteQueue,
    fds_out: VecDeque<OwnedFd>,
    fds_in: VecDeque<OwnedFd>,
}

impl<F: AsFd> Connection<F> {
    /// Wrap a non-blocking socket with [`CONNECTION_BUFFER_SIZE`] queues
    pub fn new(fd: F) -> Self {
        Self::with_capacity(fd, CONNECTION_BUFFER_SIZE)
    }

    /// Wrap a non-blocking socket with queues of `capacity` bytes each
    pub fn with_capacity(fd: F, capacity: usize) -> Self {
        Self {
            fd,
            outbound: ByteQueue::with_capacity(capacity),
            inbound: ByteQueue::with_capacity(capacity),
            fds_out: VecDeque::new(),
            fds_in: VecDeque::new(),
        }
    }

    pub fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    /// Capacity of each of the two queues
    pub fn capacity(&self) -> usize {
        self.outbound.capacity()
    }

    /// Queue `data` for the peer. Either all of it is queued or none of it.
    pub fn put(&mut self, data: &[u8]) -> ConnectionResult<()> {
        self.outbound.push(data)
    }

    /// Queue a descriptor to be sent with the next flushed bytes.
    pub fn put_fd(&mut self, fd: OwnedFd) -> ConnectionResult<()> {
        if self.fds_out.len() >= MAX_FDS {
            return Err(ConnectionError::FdOverflow { max: MAX_FDS });
        }
        self.fds_out.push_back(fd);
        Ok(())
    }

    /// Write as much of the outbound queue as the socket accepts right now.
    ///
    /// Returns the number of bytes written, `Ok(0)` if nothing was queued.
    /// Call again until [`outbound_pending`](Self::outbound_pending) is zero.
    pub fn flush(&mut self) -> ConnectionResult<usize> {
        let mut writer = SocketWriter::new(self.fd.as_fd(), &mut self.fds_out);
        let written = self.outbound.drain_to(&mut writer)?;
        trace!(written, remaining = self.outbound.len(), "Flushed connection");
        Ok(written)
    }

    /// Bytes queued for the peer but not yet written
    pub fn outbound_pending(&self) -> usize {
        self.outbound.len()
    }

    /// Room left in the outbound queue
    pub fn outbound_available(&self) -> usize {
        self.outbound.available()
    }

    /// Descriptors queued for the peer but not yet sent
    pub fn outbound_fds(&self) -> usize {
        self.fds_out.len()
    }

    /// Pull whatever the socket has available into the inbound queue.
    ///
    /// A peer shutdown is reported as [`ConnectionError::Closed`]. If the
    /// peer sent more descriptors than fit, the bytes are still queued, the
    /// extra descriptors are closed and [`ConnectionError::FdOverflow`] is
    /// returned.
    pub fn read(&mut self) -> ConnectionResult<usize> {
        let mut reader = SocketReader::new(self.fd.as_fd(), &mut self.fds_in);
        let read = self.inbound.fill_from(&mut reader)?;
        if reader.dropped() > 0 {
            return Err(ConnectionError::FdOverflow { max: MAX_FDS });
        }
        trace!(read, pending = self.inbound.len(), "Read from connection");
        Ok(read)
    }

    /// Bytes received and not yet consumed
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    /// Take exactly `len` received bytes, or nothing if fewer are pending.
    pub fn get(&mut self, len: usize) -> ConnectionResult<Vec<u8>> {
        self.inbound.pop_exact(len)
    }

    /// Like [`get`](Self::get), filling a caller-provided buffer.
    pub fn get_into(&mut self, dst: &mut [u8]) -> ConnectionResult<()> {
        self.inbound.pop_into(dst)
    }

    /// Put back the last `len` bytes taken by the immediately preceding `get`.
    pub fn restore(&mut self, len: usize) -> ConnectionResult<()> {
        self.inbound.unpop(len)
    }

    /// Take the oldest received descriptor
    pub fn get_fd(&mut self) -> Option<OwnedFd> {
        self.fds_in.pop_front()
    }

    /// Descriptors received and not yet taken
    pub fn pending_fds(&self) -> usize {
        self.fds_in.len()
    }

    /// Close every queued descriptor in both directions
    pub fn close_fds(&mut self) {
        let count = self.fds_in.len() + self.fds_out.len();
        if count > 0 {
            debug!(count, "Closing queued descriptors");
        }
        self.fds_in.clear();
        self.fds_out.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};
    use std::io::{ErrorKind, IoSlice, Read, Write};
    use std::os::fd::{AsRawFd, RawFd};
    use std::os::unix::net::UnixStream;

    fn socket_pair() -> (UnixStream, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();
        (a, b)
    }

    #[test]
    fn single_byte_round_trip() {
        let (a, b) = socket_pair();
        let mut client = Connection::new(&a);
        let mut server = Connection::new(&b);

        client.put(&[85]).unwrap();
        assert_eq!(client.flush().unwrap(), 1);
        assert_eq!(server.read().unwrap(), 1);
        assert_eq!(server.pending(), 1);
        assert_eq!(server.get(1).unwrap(), vec![85]);
        assert_eq!(server.pending(), 0);
    }

    #[test]
    fn full_capacity_round_trip() {
        let (a, b) = socket_pair();
        let mut client = Connection::new(&a);
        let mut server = Connection::new(&b);
        let payload: Vec<u8> = (0..CONNECTION_BUFFER_SIZE).map(|i| i as u8).collect();

        client.put(&payload).unwrap();
        while client.outbound_pending() > 0 {
            client.flush().unwrap();
        }
        while server.pending() < payload.len() {
            server.read().unwrap();
        }

        assert_eq!(server.get(payload.len()).unwrap(), payload);
    }

    #[test]
    fn heterogeneous_values_in_order() {
        let (a, b) = socket_pair();
        let mut client = Connection::new(&a);
        let mut server = Connection::new(&b);

        client.put(&[85u8]).unwrap();
        client.put(&0xDEADBEEFu32.to_ne_bytes()).unwrap();
        client.put(&0xCAFEDEADBEEFu64.to_ne_bytes()).unwrap();
        client.put(&[85u8]).unwrap();
        assert_eq!(client.flush().unwrap(), 14);
        assert_eq!(server.read().unwrap(), 14);

        assert_eq!(server.get(1).unwrap(), vec![85]);
        let word: [u8; 4] = server.get(4).unwrap().try_into().unwrap();
        assert_eq!(u32::from_ne_bytes(word), 0xDEADBEEF);
        let mut long = [0u8; 8];
        server.get_into(&mut long).unwrap();
        assert_eq!(u64::from_ne_bytes(long), 0xCAFEDEADBEEF);
        assert_eq!(server.get(1).unwrap(), vec![85]);
        assert_eq!(server.pending(), 0);
    }

    #[test]
    fn oversized_put_sends_nothing() {
        let (a, b) = socket_pair();
        let mut client = Connection::new(&a);
        let mut server = Connection::new(&b);

        let err = client.put(&[0u8; CONNECTION_BUFFER_SIZE + 1]).unwrap_err();
        assert!(matches!(err, ConnectionError::Full { .. }));
        assert_eq!(client.outbound_pending(), 0);
        assert_eq!(client.flush().unwrap(), 0);

        assert!(matches!(server.read(), Err(ConnectionError::WouldBlock)));
        assert_eq!(server.pending(), 0);
    }

    #[test]
    fn underflow_leaves_pending_untouched() {
        let (a, b) = socket_pair();
        let mut client = Connection::new(&a);
        let mut server = Connection::new(&b);

        client.put(b"abc").unwrap();
        client.flush().unwrap();
        server.read().unwrap();

        assert!(matches!(
            server.get(4),
            Err(ConnectionError::Underflow {
                requested: 4,
                pending: 3
            })
        ));
        assert_eq!(server.pending(), 3);
    }

    #[test]
    fn get_then_restore_is_an_exact_inverse() {
        let (a, b) = socket_pair();
        let mut client = Connection::new(&a);
        let mut server = Connection::new(&b);

        client.put(b"header-and-body").unwrap();
        client.flush().unwrap();
        server.read().unwrap();

        let before = server.pending();
        let first = server.get(6).unwrap();
        assert_eq!(server.pending(), before - 6);
        server.restore(6).unwrap();
        assert_eq!(server.pending(), before);
        assert_eq!(server.get(6).unwrap(), first);
    }

    #[test]
    fn blocked_read_keeps_header_restorable() {
        let (a, b) = socket_pair();
        let mut client = Connection::new(&a);
        let mut server = Connection::new(&b);

        client.put(b"hdr").unwrap();
        client.flush().unwrap();
        server.read().unwrap();

        let header = server.get(3).unwrap();
        assert!(matches!(server.read(), Err(ConnectionError::WouldBlock)));
        server.restore(3).unwrap();
        assert_eq!(server.get(3).unwrap(), header);
    }

    #[test]
    fn read_without_data_would_block() {
        let (_a, b) = socket_pair();
        let mut server = Connection::new(&b);
        assert!(matches!(server.read(), Err(ConnectionError::WouldBlock)));
    }

    #[test]
    fn read_after_peer_shutdown_reports_closed() {
        let (a, b) = socket_pair();
        let mut server = Connection::new(&b);
        drop(a);
        assert!(matches!(server.read(), Err(ConnectionError::Closed)));
    }

    #[test]
    fn flush_to_full_socket_would_block() {
        let (a, _b) = socket_pair();
        let mut client = Connection::new(&a);
        let chunk = [7u8; CONNECTION_BUFFER_SIZE];

        let mut blocked = false;
        for _ in 0..100_000 {
            if client.outbound_pending() == 0 {
                client.put(&chunk).unwrap();
            }
            match client.flush() {
                Ok(_) => {}
                Err(ConnectionError::WouldBlock) => {
                    blocked = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert!(blocked);
        assert!(client.outbound_pending() > 0);
    }

    #[test]
    fn dropping_connection_does_not_close_socket() {
        let (mut a, mut b) = socket_pair();
        {
            let mut conn = Connection::new(&a);
            conn.put(b"unflushed").unwrap();
        }

        a.write_all(b"still open").unwrap();
        let mut buf = [0u8; 10];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"still open");
    }

    #[test]
    fn descriptors_travel_with_bytes() {
        let (a, b) = socket_pair();
        let mut client = Connection::new(&a);
        let mut server = Connection::new(&b);
        let (passed, mut kept) = UnixStream::pair().unwrap();

        client.put_fd(OwnedFd::from(passed)).unwrap();
        client.put(b"x").unwrap();
        assert_eq!(client.outbound_fds(), 1);
        client.flush().unwrap();
        assert_eq!(client.outbound_fds(), 0);

        server.read().unwrap();
        assert_eq!(server.pending_fds(), 1);
        assert_eq!(server.get(1).unwrap(), b"x");

        let mut received = UnixStream::from(server.get_fd().unwrap());
        received.write_all(b"hi").unwrap();
        let mut buf = [0u8; 2];
        kept.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn descriptors_wait_for_bytes() {
        let (a, _b) = socket_pair();
        let mut client = Connection::new(&a);
        let (passed, _kept) = UnixStream::pair().unwrap();

        client.put_fd(OwnedFd::from(passed)).unwrap();
        assert_eq!(client.flush().unwrap(), 0);
        assert_eq!(client.outbound_fds(), 1);

        client.close_fds();
        assert_eq!(client.outbound_fds(), 0);
    }

    #[test]
    fn descriptors_beyond_limit_are_closed_and_bytes_kept() {
        let (a, b) = socket_pair();
        let mut server = Connection::new(&b);

        let mut passed = Vec::new();
        let mut kept = Vec::new();
        for _ in 0..MAX_FDS + 2 {
            let (p, k) = UnixStream::pair().unwrap();
            k.set_nonblocking(true).unwrap();
            passed.push(OwnedFd::from(p));
            kept.push(k);
        }

        let raw: Vec<RawFd> = passed.iter().map(|fd| fd.as_raw_fd()).collect();
        sendmsg::<()>(
            a.as_raw_fd(),
            &[IoSlice::new(b"x")],
            &[ControlMessage::ScmRights(&raw)],
            MsgFlags::empty(),
            None,
        )
        .unwrap();
        drop(passed);

        assert!(matches!(
            server.read(),
            Err(ConnectionError::FdOverflow { max: MAX_FDS })
        ));
        assert_eq!(server.get(1).unwrap(), b"x");
        assert_eq!(server.pending_fds(), MAX_FDS);

        // Queued descriptors stay open; the extras were closed
        let mut buf = [0u8; 1];
        for k in &mut kept[..MAX_FDS] {
            assert_eq!(k.read(&mut buf).unwrap_err().kind(), ErrorKind::WouldBlock);
        }
        for k in &mut kept[MAX_FDS..] {
            assert_eq!(k.read(&mut buf).unwrap(), 0);
        }
    }

    #[test]
    fn outbound_descriptor_queue_is_bounded() {
        let (a, _b) = socket_pair();
        let mut client = Connection::new(&a);

        for _ in 0..MAX_FDS {
            let (fd, _) = UnixStream::pair().unwrap();
            client.put_fd(OwnedFd::from(fd)).unwrap();
        }
        let (extra, _) = UnixStream::pair().unwrap();
        assert!(matches!(
            client.put_fd(OwnedFd::from(extra)),
            Err(ConnectionError::FdOverflow { max: MAX_FDS })
        ));
    }
}
