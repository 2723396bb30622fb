use super::command::Command;
use super::event::Event;
use super::future::Outcome;
use super::poller::{Doorbell, Poller};
use super::registration::Registration;
use crate::error::WaitError;

use std::collections::HashMap;
use std::io;
use std::ops::ControlFlow;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SendError, Sender, channel};
use std::thread::{self, JoinHandle};

/// The readiness worker.
///
/// The reactor runs on a dedicated thread and is the only owner of:
/// - the epoll instance and its doorbell,
/// - the registration table.
///
/// Everything else reaches it through [`Command`] messages sent over a
/// channel, followed by a doorbell ring.
pub(crate) struct Reactor {
    /// Channel receiving commands from waiters.
    receiver: Receiver<Command>,

    /// Epoll poller owning the doorbell.
    poller: Poller,

    /// Buffer used to collect I/O events from the poller.
    events: Vec<Event>,

    /// Live registrations, keyed by descriptor.
    registrations: HashMap<RawFd, Registration>,

    /// Closed flag shared with every handle.
    closed: Arc<AtomicBool>,
}

/// A handle used to communicate with the reactor thread.
///
/// Cloning this handle allows any number of threads to submit
/// registrations and removals and to wake the reactor.
#[derive(Clone)]
pub(crate) struct ReactorHandle {
    /// Sender side of the command channel.
    sender: Sender<Command>,

    /// Doorbell used to interrupt the poller.
    doorbell: Arc<Doorbell>,

    /// Set once shutdown starts; new waits fail fast afterwards.
    closed: Arc<AtomicBool>,

    /// Source of registration ids.
    next_id: Arc<AtomicU64>,
}

impl ReactorHandle {
    /// Sends a command to the reactor and wakes it.
    ///
    /// On failure the command is handed back; dropping it resolves any
    /// registration it carries with [`WaitError::Shutdown`].
    pub(crate) fn send(&self, cmd: Command) -> Result<(), SendError<Command>> {
        let result = self.sender.send(cmd);
        self.doorbell.ring();
        result
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Marks the reactor closed and asks it to stop.
    ///
    /// Returns `false` if shutdown had already been requested.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let _ = self.send(Command::Shutdown);
        true
    }
}

impl Reactor {
    /// Creates a new reactor instance.
    fn new(receiver: Receiver<Command>, poller: Poller, closed: Arc<AtomicBool>) -> Self {
        Self {
            receiver,
            poller,
            events: Vec::new(),
            registrations: HashMap::new(),
            closed,
        }
    }

    /// Starts the reactor thread and returns a handle to it.
    ///
    /// Failing to create the epoll instance, the doorbell or the thread
    /// is reported here; nothing is left running in that case.
    pub(crate) fn start(
        event_capacity: usize,
        thread_name: String,
    ) -> io::Result<(ReactorHandle, JoinHandle<()>)> {
        let (sender, receiver) = channel();
        let poller = Poller::new(event_capacity)?;
        let doorbell = poller.doorbell();
        let closed = Arc::new(AtomicBool::new(false));

        let reactor = Reactor::new(receiver, poller, closed.clone());
        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || reactor.run())?;

        let handle = ReactorHandle {
            sender,
            doorbell,
            closed,
            next_id: Arc::new(AtomicU64::new(0)),
        };

        Ok((handle, thread))
    }

    /// Runs the event loop, then tears everything down.
    fn run(mut self) {
        log::debug!("readiness worker started");

        if let Err(err) = self.event_loop() {
            log::warn!("readiness worker stopping after poll failure: {err}");
        }

        self.teardown();
        log::debug!("readiness worker stopped");
    }

    /// Main reactor event loop.
    ///
    /// Each iteration:
    /// 1. Blocks on epoll without timeout
    /// 2. Resolves registrations whose descriptor fired
    /// 3. Processes every queued command
    ///
    /// Commands are drained on every iteration. The doorbell is always
    /// read inside the poll before the queue is drained, so a command
    /// queued after the drain leaves the doorbell set for the next poll.
    fn event_loop(&mut self) -> io::Result<()> {
        loop {
            let mut events = std::mem::take(&mut self.events);
            self.poller.poll(&mut events)?;

            for event in &events {
                self.handle_event(event);
            }
            self.events = events;

            while let Ok(cmd) = self.receiver.try_recv() {
                if self.handle_command(cmd).is_break() {
                    return Ok(());
                }
            }
        }
    }

    /// Handles a single I/O event from the poller.
    fn handle_event(&mut self, event: &Event) {
        let Some(registration) = self.registrations.get(&event.fd) else {
            log::trace!("event for unregistered fd {}", event.fd);
            return;
        };

        if !event.satisfies(registration.interest) {
            return;
        }

        if let Some(registration) = self.remove(event.fd) {
            if registration.sink.resolve(Ok(Outcome::Ready)) {
                log::trace!("fd {} ready", event.fd);
            } else {
                log::trace!("fd {} ready after its waiter cancelled", event.fd);
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) -> ControlFlow<()> {
        match cmd {
            Command::Register { fd, registration } => self.register(fd, registration),
            Command::Deregister { fd, id } => self.deregister(fd, id),
            Command::Snapshot { reply } => {
                let mut fds: Vec<RawFd> = self.registrations.keys().copied().collect();
                fds.sort_unstable();
                let _ = reply.send(fds);
            }
            Command::Shutdown => return ControlFlow::Break(()),
        }

        ControlFlow::Continue(())
    }

    fn register(&mut self, fd: RawFd, registration: Registration) {
        if self.registrations.contains_key(&fd) {
            log::trace!("fd {fd} already has a pending wait");
            registration.sink.resolve(Err(WaitError::AlreadyPending { fd }));
            return;
        }

        if let Err(err) = self.poller.register(fd, registration.interest) {
            log::trace!("fd {fd} refused by epoll: {err}");
            registration.sink.resolve(Err(WaitError::registration(err)));
            return;
        }

        log::trace!(
            "fd {fd} registered for {:?} (id {})",
            registration.interest,
            registration.id
        );
        self.registrations.insert(fd, registration);
    }

    fn deregister(&mut self, fd: RawFd, id: u64) {
        match self.registrations.get(&fd) {
            Some(registration) if registration.id == id => {
                if let Some(registration) = self.remove(fd) {
                    registration.sink.resolve(Ok(Outcome::Cancelled));
                    log::trace!("fd {fd} cancelled (id {id})");
                }
            }
            _ => log::trace!("stale removal for fd {fd} (id {id}) ignored"),
        }
    }

    /// Removes a registration from both the table and epoll.
    fn remove(&mut self, fd: RawFd) -> Option<Registration> {
        let registration = self.registrations.remove(&fd)?;

        if let Err(err) = self.poller.deregister(fd) {
            log::debug!("epoll removal of fd {fd} failed: {err}");
        }

        Some(registration)
    }

    /// Resolves every outstanding and queued request with `Shutdown`.
    ///
    /// The poller, and with it the doorbell, is released when `self` is
    /// dropped right after; commands sent later are refused by the closed
    /// channel and resolved by their dropped sinks.
    fn teardown(&mut self) {
        self.closed.store(true, Ordering::Release);

        let fds: Vec<RawFd> = self.registrations.keys().copied().collect();
        for fd in fds {
            if let Some(registration) = self.remove(fd) {
                registration.sink.resolve(Err(WaitError::Shutdown));
            }
        }

        while let Ok(cmd) = self.receiver.try_recv() {
            drop(cmd);
        }
    }
}
