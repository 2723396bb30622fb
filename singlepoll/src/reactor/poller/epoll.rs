//! Linux `epoll`-based poller implementation.
//!
//! Responsibilities:
//! - Register file descriptors with read/write interests
//! - Block, without timeout, waiting for I/O readiness
//! - Wake up when the doorbell is rung from another thread
//!
//! Descriptors are registered level-triggered and tagged with their own
//! number. The doorbell uses a reserved token no descriptor can produce.

use super::common::{Doorbell, Interest};
use super::unix::{sys_epoll_create, sys_epoll_ctl, sys_epoll_wait, sys_eventfd};
use crate::reactor::event::Event;

use libc::{
    EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLRDHUP, epoll_event,
};
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;

/// Reserved token used for the doorbell event.
///
/// Caller tokens are non-negative descriptor numbers, so `u64::MAX`
/// can never collide with them.
pub(crate) const DOORBELL_TOKEN: u64 = u64::MAX;

/// Linux `epoll` poller.
///
/// This poller owns:
/// - an `epoll` instance,
/// - a [`Doorbell`] registered for its whole lifetime,
/// - a reusable kernel event buffer.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: OwnedFd,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,

    /// Doorbell wrapping the internal eventfd.
    doorbell: Arc<Doorbell>,
}

impl EpollPoller {
    /// Creates the epoll instance and registers a fresh doorbell with it.
    ///
    /// `capacity` bounds how many events a single [`poll`](Self::poll)
    /// can report and must be non-zero.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let epoll = sys_epoll_create()?;
        let eventfd = sys_eventfd()?;

        sys_epoll_ctl(
            epoll.as_raw_fd(),
            EPOLL_CTL_ADD,
            eventfd.as_raw_fd(),
            EPOLLIN as u32,
            DOORBELL_TOKEN,
        )?;

        Ok(Self {
            epoll,
            events: Vec::with_capacity(capacity.max(1)),
            doorbell: Arc::new(Doorbell::new(eventfd)),
        })
    }

    /// Returns the doorbell that interrupts [`poll`](Self::poll).
    pub(crate) fn doorbell(&self) -> Arc<Doorbell> {
        self.doorbell.clone()
    }

    /// Adds a descriptor to the interest set.
    pub(crate) fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        if fd < 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }

        let mut flags = 0;

        if interest.is_readable() {
            flags |= EPOLLIN | EPOLLRDHUP;
        }
        if interest.is_writable() {
            flags |= EPOLLOUT;
        }

        sys_epoll_ctl(
            self.epoll.as_raw_fd(),
            EPOLL_CTL_ADD,
            fd,
            flags as u32,
            fd as u64,
        )
    }

    /// Removes a descriptor from the interest set.
    ///
    /// Fails with `ENOENT` or `EBADF` if the caller already closed it,
    /// which removes it from epoll implicitly.
    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        sys_epoll_ctl(self.epoll.as_raw_fd(), EPOLL_CTL_DEL, fd, 0, 0)
    }

    /// Blocks until at least one descriptor is ready or the doorbell rings.
    ///
    /// Ready descriptors are written to `events`. The doorbell itself is
    /// never reported there; it is drained here and signalled through the
    /// return value instead. Every fired entry is compared against the
    /// doorbell token.
    ///
    /// An interrupted wait (`EINTR`) returns `Ok(false)` with no events.
    pub(crate) fn poll(&mut self, events: &mut Vec<Event>) -> io::Result<bool> {
        events.clear();

        if let Err(err) = sys_epoll_wait(self.epoll.as_raw_fd(), &mut self.events, -1) {
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }

        let mut rang = false;

        for ev in &self.events {
            let token = ev.u64;
            let flags = ev.events;

            if token == DOORBELL_TOKEN {
                self.doorbell.drain();
                rang = true;
                continue;
            }

            let readable = flags & ((EPOLLIN | EPOLLRDHUP | EPOLLHUP | EPOLLERR) as u32) != 0;
            let writable = flags & ((EPOLLOUT | EPOLLHUP | EPOLLERR) as u32) != 0;

            events.push(Event {
                fd: token as RawFd,
                readable,
                writable,
            });
        }

        Ok(rang)
    }
}

impl Drop for EpollPoller {
    /// Releases the doorbell together with the epoll instance.
    fn drop(&mut self) {
        self.doorbell.release();
    }
}
