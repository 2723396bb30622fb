use super::command::Command;
use super::core::ReactorHandle;
use super::poller::Interest;
use super::registration::{Claim, Completion, Registration, Resolution, Sink};
use crate::cancel::CancellationToken;
use crate::error::WaitError;

use std::future::Future;
use std::os::fd::RawFd;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// How a successful wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The descriptor satisfied the requested interest.
    Ready,

    /// The cancellation token fired first.
    Cancelled,
}

enum State {
    /// Not polled yet; nothing has been sent to the worker.
    Idle,

    /// A registration is queued or live in the worker.
    Registered { id: u64, completion: Arc<Completion> },

    /// The outcome has been returned.
    Done,
}

/// Future returned by [`Handle::wait`](crate::Handle::wait).
///
/// The registration is submitted on first poll. From then on the future
/// races the worker's resolution against the cancellation token:
///
/// - the worker's result is checked first on every poll, so a result
///   already delivered wins over a token that fires concurrently;
/// - if the token wins, a removal is queued for the worker and
///   [`Outcome::Cancelled`] is returned without waiting for it.
///
/// Dropping a registered `Wait` before completion removes its
/// registration the same way.
#[must_use = "futures do nothing unless polled"]
pub struct Wait {
    reactor: ReactorHandle,
    fd: RawFd,
    interest: Interest,
    cancel: CancellationToken,

    /// Key of this future's waker inside the token.
    waiter: Option<usize>,

    state: State,
}

impl Wait {
    pub(crate) fn new(
        reactor: ReactorHandle,
        fd: RawFd,
        interest: Interest,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reactor,
            fd,
            interest,
            cancel,
            waiter: None,
            state: State::Idle,
        }
    }

    /// The descriptor this future waits on.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// The interest this future waits for.
    pub fn interest(&self) -> Interest {
        self.interest
    }

    fn finish(&mut self, result: Resolution) -> Poll<Resolution> {
        self.state = State::Done;
        self.cancel.unregister(&mut self.waiter);
        Poll::Ready(result)
    }

    /// Submits the registration. The waker is parked in the completion
    /// before the command is sent so no resolution can be missed.
    fn submit(&mut self, cx: &mut Context<'_>) {
        let id = self.reactor.next_id();
        let completion = Completion::new();
        let _ = completion.poll_result(cx.waker());

        let registration = Registration {
            id,
            interest: self.interest,
            sink: Sink::new(completion.clone()),
        };

        // A refused command is dropped here and its sink resolves the
        // completion with `Shutdown`.
        let _ = self.reactor.send(Command::Register {
            fd: self.fd,
            registration,
        });

        self.state = State::Registered { id, completion };
    }
}

impl Future for Wait {
    type Output = Result<Outcome, WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let State::Idle = this.state {
            if this.interest.is_empty() {
                return this.finish(Err(WaitError::UnsupportedMode));
            }
            if this.reactor.is_closed() {
                return this.finish(Err(WaitError::Shutdown));
            }
            if this.cancel.is_cancelled() {
                return this.finish(Ok(Outcome::Cancelled));
            }

            this.submit(cx);
        }

        let (id, completion) = match &this.state {
            State::Registered { id, completion } => (*id, completion.clone()),
            State::Idle => unreachable!(),
            State::Done => panic!("`Wait` polled after completion"),
        };

        if let Some(result) = completion.poll_result(cx.waker()) {
            return this.finish(result);
        }

        if !this.cancel.poll_cancelled(&mut this.waiter, cx.waker()) {
            return Poll::Pending;
        }

        let result = match completion.claim_cancelled() {
            Claim::Cancelled => {
                let _ = this.reactor.send(Command::Deregister { fd: this.fd, id });
                Ok(Outcome::Cancelled)
            }
            Claim::Resolved(result) => result,
        };

        this.finish(result)
    }
}

impl Drop for Wait {
    fn drop(&mut self) {
        if let State::Registered { id, completion } = &self.state {
            if let Claim::Cancelled = completion.claim_cancelled() {
                let _ = self.reactor.send(Command::Deregister {
                    fd: self.fd,
                    id: *id,
                });
            }
        }

        self.cancel.unregister(&mut self.waiter);
    }
}
