use super::future::Outcome;
use super::poller::Interest;
use crate::error::WaitError;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Waker;

/// Result delivered for one registration.
pub(crate) type Resolution = Result<Outcome, WaitError>;

/// A pending wait, as stored in the worker's registration table.
pub(crate) struct Registration {
    /// Distinguishes successive registrations of the same descriptor.
    pub(crate) id: u64,

    /// Readiness the waiter asked for.
    pub(crate) interest: Interest,

    /// Worker side of the completion slot.
    pub(crate) sink: Sink,
}

/// Settlement state shared by the worker and one waiter.
#[derive(Default)]
struct Slot {
    /// Set once, by whichever side settles first.
    settled: bool,

    /// Worker result waiting to be picked up.
    result: Option<Resolution>,

    /// Waker of the suspended waiter.
    waker: Option<Waker>,
}

/// One-shot completion slot settled at most once.
///
/// The worker settles it through [`resolve`](Self::resolve), the waiter
/// through [`claim_cancelled`](Self::claim_cancelled). Both run under the
/// same lock, so exactly one of them wins and the other becomes a no-op.
pub(crate) struct Completion {
    slot: Mutex<Slot>,
}

/// Result of a waiter trying to settle a completion as cancelled.
pub(crate) enum Claim {
    /// The waiter won; the worker's eventual resolution is discarded.
    Cancelled,

    /// The worker resolved first; its result takes precedence.
    Resolved(Resolution),
}

impl Completion {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the worker's result and wakes the waiter.
    ///
    /// Returns `false` if the waiter had already settled the slot.
    pub(crate) fn resolve(&self, result: Resolution) -> bool {
        let waker = {
            let mut slot = self.lock();
            if slot.settled {
                return false;
            }

            slot.settled = true;
            slot.result = Some(result);
            slot.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }

        true
    }

    /// Takes the worker's result, or parks `waker` until there is one.
    pub(crate) fn poll_result(&self, waker: &Waker) -> Option<Resolution> {
        let mut slot = self.lock();

        if let Some(result) = slot.result.take() {
            return Some(result);
        }

        match &slot.waker {
            Some(current) if current.will_wake(waker) => {}
            _ => slot.waker = Some(waker.clone()),
        }

        None
    }

    /// Settles the slot as cancelled unless the worker already resolved it.
    pub(crate) fn claim_cancelled(&self) -> Claim {
        let mut slot = self.lock();

        if let Some(result) = slot.result.take() {
            return Claim::Resolved(result);
        }

        slot.settled = true;
        slot.waker = None;
        Claim::Cancelled
    }
}

/// Worker-owned sending half of a [`Completion`].
///
/// A sink dropped without being resolved resolves its completion with
/// [`WaitError::Shutdown`]. This covers requests still queued, or
/// refused by a closed queue, when the worker exits.
pub(crate) struct Sink {
    completion: Arc<Completion>,
    resolved: bool,
}

impl Sink {
    pub(crate) fn new(completion: Arc<Completion>) -> Self {
        Self {
            completion,
            resolved: false,
        }
    }

    /// Resolves the completion. Returns `false` if the waiter had already
    /// cancelled.
    pub(crate) fn resolve(mut self, result: Resolution) -> bool {
        self.resolved = true;
        self.completion.resolve(result)
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        if !self.resolved {
            self.completion.resolve(Err(WaitError::Shutdown));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn worker_result_wins_over_later_cancellation() {
        let completion = Completion::new();

        assert!(completion.resolve(Ok(Outcome::Ready)));

        match completion.claim_cancelled() {
            Claim::Resolved(Ok(Outcome::Ready)) => {}
            _ => panic!("resolved completion must keep the worker result"),
        }
    }

    #[test]
    fn cancellation_claimed_first_discards_worker_result() {
        let completion = Completion::new();

        assert!(matches!(completion.claim_cancelled(), Claim::Cancelled));
        assert!(!completion.resolve(Ok(Outcome::Ready)));
        assert!(completion.poll_result(Waker::noop()).is_none());
    }

    #[test]
    fn resolve_wakes_parked_waiter_once() {
        let completion = Completion::new();
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());

        assert!(completion.poll_result(&waker).is_none());
        assert!(completion.resolve(Ok(Outcome::Ready)));
        assert!(!completion.resolve(Err(WaitError::Shutdown)));

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(matches!(
            completion.poll_result(&waker),
            Some(Ok(Outcome::Ready))
        ));
    }

    #[test]
    fn dropped_sink_resolves_with_shutdown() {
        let completion = Completion::new();
        drop(Sink::new(completion.clone()));

        assert!(matches!(
            completion.poll_result(Waker::noop()),
            Some(Err(WaitError::Shutdown))
        ));
    }

    #[test]
    fn resolved_sink_does_not_resolve_again_on_drop() {
        let completion = Completion::new();
        let sink = Sink::new(completion.clone());

        assert!(sink.resolve(Err(WaitError::AlreadyPending { fd: 4 })));
        assert!(matches!(
            completion.poll_result(Waker::noop()),
            Some(Err(WaitError::AlreadyPending { fd: 4 }))
        ));
    }
}
