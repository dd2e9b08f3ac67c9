//! Non-blocking socket adapters used by the connection queues
//!
//! Both adapters go through `sendmsg(2)`/`recvmsg(2)` so that descriptors can
//! travel as `SCM_RIGHTS` ancillary data alongside the byte stream.

use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};
use std::collections::VecDeque;
use std::io::{self, IoSlice, IoSliceMut, Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use tracing::{error, warn};

/// Maximum number of descriptors queued in each direction
pub const MAX_FDS: usize = 8;

/// Most descriptors the kernel passes in one `SCM_RIGHTS` message
/// (`SCM_MAX_FD` on Linux). The receive buffer is sized for this so a peer
/// sending more than [`MAX_FDS`] cannot truncate the control data.
const SCM_MAX_FD: usize = 253;

/// Sends bytes on a borrowed socket, attaching every queued outbound
/// descriptor to the first successful send.
pub(crate) struct SocketWriter<'a> {
    fd: BorrowedFd<'a>,
    fds: &'a mut VecDeque<OwnedFd>,
}

impl<'a> SocketWriter<'a> {
    pub(crate) fn new(fd: BorrowedFd<'a>, fds: &'a mut VecDeque<OwnedFd>) -> Self {
        Self { fd, fds }
    }
}

impl Write for SocketWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let raw: Vec<RawFd> = self.fds.iter().map(|fd| fd.as_raw_fd()).collect();
        let iov = [IoSlice::new(buf)];
        let cmsgs: Vec<ControlMessage<'_>> = if raw.is_empty() {
            Vec::new()
        } else {
            vec![ControlMessage::ScmRights(&raw)]
        };

        let sent = sendmsg::<()>(
            self.fd.as_raw_fd(),
            &iov,
            &cmsgs,
            MsgFlags::MSG_DONTWAIT | MsgFlags::MSG_NOSIGNAL,
            None,
        )
        .map_err(io::Error::from)?;

        // The kernel holds its own references now; our copies can be closed.
        self.fds.clear();
        Ok(sent)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Receives bytes from a borrowed socket, collecting any descriptors that
/// arrive with them.
pub(crate) struct SocketReader<'a> {
    fd: BorrowedFd<'a>,
    fds: &'a mut VecDeque<OwnedFd>,
    dropped: usize,
}

impl<'a> SocketReader<'a> {
    pub(crate) fn new(fd: BorrowedFd<'a>, fds: &'a mut VecDeque<OwnedFd>) -> Self {
        Self {
            fd,
            fds,
            dropped: 0,
        }
    }

    /// Descriptors that arrived while the inbound descriptor queue was full
    pub(crate) fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Read for SocketReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut iov = [IoSliceMut::new(buf)];
        let mut cmsg_buffer = nix::cmsg_space!([RawFd; SCM_MAX_FD]);

        let msg = recvmsg::<()>(
            self.fd.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_buffer),
            MsgFlags::MSG_DONTWAIT | MsgFlags::MSG_CMSG_CLOEXEC,
        )
        .map_err(io::Error::from)?;
        let bytes = msg.bytes;

        // The bytes are already off the socket; never fail the read from here.
        if msg.flags.contains(MsgFlags::MSG_CTRUNC) {
            self.dropped += 1;
            error!(bytes, "Control data truncated, descriptors lost");
            return Ok(bytes);
        }

        if let Ok(cmsgs) = msg.cmsgs() {
            for cmsg in cmsgs {
                if let ControlMessageOwned::ScmRights(received) = cmsg {
                    for raw in received {
                        // SAFETY: the kernel installed this descriptor for us
                        // during recvmsg and nothing else refers to it.
                        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
                        if self.fds.len() < MAX_FDS {
                            self.fds.push_back(fd);
                        } else {
                            self.dropped += 1;
                        }
                    }
                }
            }
        }

        if self.dropped > 0 {
            warn!(
                dropped = self.dropped,
                "Inbound descriptor queue full, closed extra descriptors"
            );
        }

        Ok(bytes)
    }
}
