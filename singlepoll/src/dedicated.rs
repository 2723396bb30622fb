//! A poller bound to a single descriptor.
//!
//! [`DedicatedPoller`] owns its own epoll instance and doorbell and
//! watches exactly one descriptor. It needs no worker thread: the calling
//! thread blocks in `epoll_wait` itself, and a cancellation token rings
//! the doorbell to interrupt it.

use crate::cancel::CancellationToken;
use crate::error::WaitError;
use crate::reactor::event::Event;
use crate::reactor::future::Outcome;
use crate::reactor::poller::{Doorbell, Interest, Poller};

use std::os::fd::RawFd;
use std::sync::Arc;
use std::task::{Wake, Waker};

/// Room for the watched descriptor and the doorbell.
const EVENT_CAPACITY: usize = 2;

/// Rings a doorbell when the token it is parked in fires.
struct DoorbellWaker(Arc<Doorbell>);

impl Wake for DoorbellWaker {
    fn wake(self: Arc<Self>) {
        self.0.ring();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.ring();
    }
}

/// Blocking readiness waits on one descriptor.
///
/// The descriptor stays registered for the poller's whole lifetime, so
/// repeated waits cost a single `epoll_wait` each. It is removed again
/// when the poller is dropped; the caller must keep it open until then.
///
/// # Examples
///
/// ```rust,no_run
/// use singlepoll::{CancellationToken, DedicatedPoller, Outcome};
/// use std::net::TcpStream;
/// use std::os::fd::AsRawFd;
/// use std::time::Duration;
///
/// let stream = TcpStream::connect("127.0.0.1:8080")?;
/// stream.set_nonblocking(true)?;
///
/// let mut poller = DedicatedPoller::writable(stream.as_raw_fd())?;
/// let cancel = CancellationToken::timeout(Duration::from_secs(5));
///
/// if poller.wait(&cancel)? == Outcome::Ready {
///     // connected
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct DedicatedPoller {
    fd: RawFd,
    interest: Interest,
    poller: Poller,
    events: Vec<Event>,
}

impl DedicatedPoller {
    /// Creates a poller watching `fd` for `interest`.
    ///
    /// Fails with [`WaitError::UnsupportedMode`] for an empty interest and
    /// with [`WaitError::RegistrationFailed`] if the epoll instance, the
    /// doorbell or the registration cannot be set up.
    pub fn new(fd: RawFd, interest: Interest) -> Result<Self, WaitError> {
        if interest.is_empty() {
            return Err(WaitError::UnsupportedMode);
        }

        let poller = Poller::new(EVENT_CAPACITY).map_err(WaitError::registration)?;
        poller
            .register(fd, interest)
            .map_err(WaitError::registration)?;

        log::trace!("dedicated poller watching fd {fd} for {interest:?}");

        Ok(Self {
            fd,
            interest,
            poller,
            events: Vec::with_capacity(EVENT_CAPACITY),
        })
    }

    /// Shorthand for `DedicatedPoller::new(fd, Interest::WRITABLE)`.
    pub fn writable(fd: RawFd) -> Result<Self, WaitError> {
        Self::new(fd, Interest::WRITABLE)
    }

    /// The watched descriptor.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Blocks until the descriptor is ready or `cancel` fires.
    ///
    /// After every wake, readiness is checked before the token, so a
    /// descriptor that became ready together with the cancellation
    /// reports [`Outcome::Ready`].
    pub fn wait(&mut self, cancel: &CancellationToken) -> Result<Outcome, WaitError> {
        let waker = Waker::from(Arc::new(DoorbellWaker(self.poller.doorbell())));
        let mut key = None;

        let result = loop {
            if cancel.poll_cancelled(&mut key, &waker) {
                break Ok(Outcome::Cancelled);
            }

            if let Err(err) = self.poller.poll(&mut self.events) {
                log::warn!("dedicated poll on fd {} failed: {err}", self.fd);
                break Err(WaitError::registration(err));
            }

            let ready = self
                .events
                .iter()
                .any(|ev| ev.fd == self.fd && ev.satisfies(self.interest));

            if ready {
                break Ok(Outcome::Ready);
            }
        };

        cancel.unregister(&mut key);
        result
    }
}

impl Drop for DedicatedPoller {
    fn drop(&mut self) {
        if let Err(err) = self.poller.deregister(self.fd) {
            log::debug!("fd {} was already gone from its poller: {err}", self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn empty_interest_is_unsupported() {
        let (a, _b) = UnixStream::pair().unwrap();
        let err = DedicatedPoller::new(a.as_raw_fd(), Interest::new(false, false))
            .err()
            .unwrap();

        assert!(matches!(err, WaitError::UnsupportedMode));
    }

    #[test]
    fn negative_descriptor_fails_registration() {
        let err = DedicatedPoller::writable(-1).err().unwrap();

        assert_eq!(err.os_error().and_then(|e| e.raw_os_error()), Some(libc::EBADF));
    }

    #[test]
    fn fresh_socket_is_writable() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut poller = DedicatedPoller::writable(a.as_raw_fd()).unwrap();

        let outcome = poller.wait(&CancellationToken::new()).unwrap();
        assert_eq!(outcome, Outcome::Ready);
    }

    #[test]
    fn readable_after_peer_writes() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut poller = DedicatedPoller::new(a.as_raw_fd(), Interest::READABLE).unwrap();

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            b.write_all(b"ping").unwrap();
            b
        });

        let outcome = poller.wait(&CancellationToken::new()).unwrap();
        assert_eq!(outcome, Outcome::Ready);
        writer.join().unwrap();
    }

    #[test]
    fn cancel_interrupts_blocked_wait() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut poller = DedicatedPoller::new(a.as_raw_fd(), Interest::READABLE).unwrap();
        let cancel = CancellationToken::new();

        let remote = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remote.cancel();
        });

        let started = Instant::now();
        let outcome = poller.wait(&cancel).unwrap();

        assert_eq!(outcome, Outcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        canceller.join().unwrap();
    }

    #[test]
    fn deadline_interrupts_blocked_wait() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut poller = DedicatedPoller::new(a.as_raw_fd(), Interest::READABLE).unwrap();

        let outcome = poller
            .wait(&CancellationToken::timeout(Duration::from_millis(30)))
            .unwrap();

        assert_eq!(outcome, Outcome::Cancelled);
    }

    #[test]
    fn poller_can_wait_repeatedly() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut poller = DedicatedPoller::writable(a.as_raw_fd()).unwrap();
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            assert_eq!(poller.wait(&cancel).unwrap(), Outcome::Ready);
        }
    }
}
