use super::block_on::block_on;
use crate::cancel::CancellationToken;
use crate::error::WaitError;
use crate::reactor::future::{Outcome, Wait};
use crate::reactor::poller::Interest;
use crate::reactor::{Command, ReactorHandle};

use std::os::fd::RawFd;
use std::sync::mpsc;

/// Cheap, cloneable entry point to a [`Multiplexer`](crate::Multiplexer).
///
/// Handles may be sent to and used from any thread. They never touch
/// the epoll instance; each wait is forwarded to the worker thread.
#[derive(Clone)]
pub struct Handle {
    reactor: ReactorHandle,
}

impl Handle {
    pub(crate) fn new(reactor: ReactorHandle) -> Self {
        Self { reactor }
    }

    /// Waits until `fd` is ready for `interest` or `cancel` fires.
    ///
    /// `fd` must be an open, non-blocking descriptor and stay open until
    /// the returned future completes or is dropped. At most one wait per
    /// descriptor may be pending; a second one resolves with
    /// [`WaitError::AlreadyPending`] and leaves the first untouched.
    ///
    /// Nothing is sent to the worker until the future is first polled.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let cancel = CancellationToken::timeout(Duration::from_secs(1));
    /// match handle.wait(socket.as_raw_fd(), Interest::READABLE, &cancel).await? {
    ///     Outcome::Ready => { /* read without blocking */ }
    ///     Outcome::Cancelled => { /* gave up */ }
    /// }
    /// ```
    pub fn wait(&self, fd: RawFd, interest: Interest, cancel: &CancellationToken) -> Wait {
        Wait::new(self.reactor.clone(), fd, interest, cancel.clone())
    }

    /// Like [`wait`](Self::wait), with the interest given as a mode string
    /// (`"r"`, `"w"` or `"rw"`).
    ///
    /// An unsupported mode fails immediately, without reaching the worker.
    pub fn wait_mode(
        &self,
        fd: RawFd,
        mode: &str,
        cancel: &CancellationToken,
    ) -> Result<Wait, WaitError> {
        let interest = Interest::from_mode(mode)?;
        Ok(self.wait(fd, interest, cancel))
    }

    /// Blocks the calling thread until the wait resolves.
    pub fn wait_blocking(
        &self,
        fd: RawFd,
        interest: Interest,
        cancel: &CancellationToken,
    ) -> Result<Outcome, WaitError> {
        block_on(self.wait(fd, interest, cancel))
    }

    /// Blocking form of [`wait_mode`](Self::wait_mode).
    pub fn wait_mode_blocking(
        &self,
        fd: RawFd,
        mode: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome, WaitError> {
        block_on(self.wait_mode(fd, mode, cancel)?)
    }

    /// Returns the descriptors currently registered with the worker,
    /// sorted ascending.
    ///
    /// The query is queued behind every command this thread sent before
    /// it, so a removal issued earlier by the caller is already reflected.
    pub fn registered(&self) -> Result<Vec<RawFd>, WaitError> {
        if self.reactor.is_closed() {
            return Err(WaitError::Shutdown);
        }

        let (reply, response) = mpsc::channel();
        self.reactor
            .send(Command::Snapshot { reply })
            .map_err(|_| WaitError::Shutdown)?;

        response.recv().map_err(|_| WaitError::Shutdown)
    }

    /// Starts shutting the multiplexer down without waiting for it.
    ///
    /// Use [`Multiplexer::shutdown`](crate::Multiplexer::shutdown) to also
    /// join the worker thread.
    pub fn shutdown(&self) {
        if self.reactor.close() {
            log::debug!("readiness multiplexer shutdown requested");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.reactor.is_closed()
    }
}
