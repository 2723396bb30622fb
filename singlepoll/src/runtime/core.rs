use super::builder::MultiplexerBuilder;
use super::handle::Handle;
use crate::cancel::CancellationToken;
use crate::error::WaitError;
use crate::reactor::future::Wait;
use crate::reactor::poller::Interest;
use crate::reactor::{Reactor, ReactorHandle};

use std::os::fd::RawFd;
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;

/// A readiness multiplexer.
///
/// `Multiplexer` owns:
/// - one epoll instance and its doorbell,
/// - one worker thread that exclusively manages them.
///
/// Callers wait through [`Handle`]s obtained from [`handle`](Self::handle).
/// Dropping the multiplexer shuts it down and joins the worker; every
/// outstanding wait resolves with [`WaitError::Shutdown`].
pub struct Multiplexer {
    /// Handle shared with callers.
    handle: Handle,

    /// Worker thread, taken when joined.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Multiplexer {
    /// Starts a multiplexer with default configuration.
    ///
    /// See [`MultiplexerBuilder`] to customise it.
    pub fn new() -> Result<Self, WaitError> {
        MultiplexerBuilder::new().build()
    }

    /// Returns a [`MultiplexerBuilder`].
    pub fn builder() -> MultiplexerBuilder {
        MultiplexerBuilder::new()
    }

    pub(crate) fn start(event_capacity: usize, thread_name: String) -> Result<Self, WaitError> {
        let (reactor, worker): (ReactorHandle, JoinHandle<()>) =
            Reactor::start(event_capacity, thread_name).map_err(WaitError::registration)?;

        Ok(Self {
            handle: Handle::new(reactor),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Returns a handle for submitting waits.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Shorthand for `self.handle().wait(..)`.
    pub fn wait(&self, fd: RawFd, interest: Interest, cancel: &CancellationToken) -> Wait {
        self.handle.wait(fd, interest, cancel)
    }

    /// Shuts the multiplexer down and waits for the worker to exit.
    ///
    /// New waits fail with [`WaitError::Shutdown`] as soon as this is
    /// called; outstanding ones are resolved with it before this returns.
    /// Calling it again does nothing.
    pub fn shutdown(&self) {
        self.handle.shutdown();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::warn!("readiness worker panicked");
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.handle.is_shut_down()
    }

    /// Name of the worker thread, while it has not been joined.
    pub fn thread_name(&self) -> Option<String> {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|w| w.thread().name().map(str::to_owned))
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
