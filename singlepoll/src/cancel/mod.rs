//! Cancellation tokens.
//!
//! A [`CancellationToken`] is the caller-supplied signal that ends a wait
//! early. Tokens are cheap to clone; clones share state. They compose:
//! - [`child`](CancellationToken::child) tokens are cancelled with their
//!   parent but can be cancelled on their own,
//! - [`with_deadline`](CancellationToken::with_deadline) and
//!   [`with_timeout`](CancellationToken::with_timeout) derive a child that
//!   also cancels itself when the deadline passes.
//!
//! Deadlines are fired by a single background thread shared by the whole
//! process, and are also checked whenever the token is queried.

mod timer;

use crate::utils::Slab;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::Waker;
use std::time::{Duration, Instant};

/// Why a token was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`CancellationToken::cancel`] was called on the token or an ancestor.
    Cancelled,

    /// The token's deadline, or an ancestor's, has passed.
    DeadlineExceeded,
}

/// A shareable, composable cancellation signal.
///
/// # Examples
///
/// ```rust
/// use singlepoll::{CancelReason, CancellationToken};
///
/// let parent = CancellationToken::new();
/// let child = parent.child();
///
/// parent.cancel();
/// assert!(child.is_cancelled());
/// assert_eq!(child.reason(), Some(CancelReason::Cancelled));
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

struct Inner {
    /// Fast-path flag, set together with `State::reason`.
    cancelled: AtomicBool,

    /// Earliest deadline of this token and its ancestors.
    deadline: Option<Instant>,

    state: Mutex<State>,
}

struct State {
    reason: Option<CancelReason>,

    /// Wakers of the futures currently waiting on this token.
    waiters: Slab<Waker>,

    children: Vec<Weak<Inner>>,
}

impl Inner {
    fn new(deadline: Option<Instant>) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            deadline,
            state: Mutex::new(State {
                reason: None,
                waiters: Slab::new(),
                children: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if cancelled, firing an expired deadline first.
    fn check(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel(CancelReason::DeadlineExceeded);
                true
            }
            _ => false,
        }
    }

    /// Cancels this token and its descendants. Only the first call has
    /// any effect.
    fn cancel(&self, reason: CancelReason) {
        let (waiters, children) = {
            let mut state = self.lock();
            if state.reason.is_some() {
                return;
            }

            state.reason = Some(reason);
            self.cancelled.store(true, Ordering::Release);

            (state.waiters.drain(), std::mem::take(&mut state.children))
        };

        for waker in waiters {
            waker.wake();
        }

        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel(reason);
            }
        }
    }
}

impl CancellationToken {
    /// Creates a token that is only cancelled by [`cancel`](Self::cancel).
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new(None)),
        }
    }

    /// Creates a token that cancels itself after `duration`.
    pub fn timeout(duration: Duration) -> Self {
        Self::new().with_timeout(duration)
    }

    /// Cancels the token, its clones and its children.
    ///
    /// Cancelling an already cancelled token does nothing.
    pub fn cancel(&self) {
        self.inner.cancel(CancelReason::Cancelled);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.check()
    }

    /// Returns why the token was cancelled, or `None` if it is still live.
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.check();
        self.inner.lock().reason
    }

    /// The effective deadline, inherited from ancestors when earlier.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Derives a token cancelled together with this one.
    pub fn child(&self) -> Self {
        self.derive(None)
    }

    /// Derives a child token that also cancels itself at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        self.derive(Some(deadline))
    }

    /// Derives a child token that also cancels itself after `duration`.
    pub fn with_timeout(&self, duration: Duration) -> Self {
        self.with_deadline(Instant::now() + duration)
    }

    fn derive(&self, deadline: Option<Instant>) -> Self {
        let deadline = match (self.inner.deadline, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let child = Arc::new(Inner::new(deadline));

        let parent_reason = {
            let mut state = self.inner.lock();
            if state.reason.is_none() {
                state.children.retain(|c| c.strong_count() > 0);
                state.children.push(Arc::downgrade(&child));
            }
            state.reason
        };

        if let Some(reason) = parent_reason {
            child.cancel(reason);
        } else if let Some(deadline) = deadline {
            // Scheduled per token: an inherited deadline must fire even
            // once the ancestor is gone.
            timer::schedule(deadline, Arc::downgrade(&child));
        }

        Self { inner: child }
    }

    /// Returns `true` if cancelled; otherwise parks `waker` under `key`
    /// until the token fires.
    ///
    /// `key` is owned by the caller and must be passed back to
    /// [`unregister`](Self::unregister) once the caller stops waiting.
    pub(crate) fn poll_cancelled(&self, key: &mut Option<usize>, waker: &Waker) -> bool {
        if self.inner.check() {
            return true;
        }

        let mut state = self.inner.lock();
        if state.reason.is_some() {
            return true;
        }

        if let Some(current) = key.and_then(|k| state.waiters.get_mut(k)) {
            if !current.will_wake(waker) {
                *current = waker.clone();
            }
            return false;
        }

        *key = Some(state.waiters.insert(waker.clone()));
        false
    }

    /// Forgets the waker parked under `key`, if any.
    pub(crate) fn unregister(&self, key: &mut Option<usize>) {
        if let Some(k) = key.take() {
            self.inner.lock().waiters.remove(k);
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();

        f.debug_struct("CancellationToken")
            .field("reason", &state.reason)
            .field("deadline", &self.inner.deadline)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}
