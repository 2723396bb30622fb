use super::{CancelReason, Inner};

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::thread;
use std::time::Instant;

/// An entry in the deadline queue.
///
/// Holds the token weakly: a token dropped before its deadline costs
/// nothing but the heap slot.
struct TimerEntry {
    /// The time at which the token should be cancelled.
    deadline: Instant,

    /// Token to cancel with [`CancelReason::DeadlineExceeded`].
    token: Weak<Inner>,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    /// Two timer entries are equal if their deadlines are equal.
    fn eq(&self, other: &Self) -> bool {
        self.deadline.eq(&other.deadline)
    }
}

impl Ord for TimerEntry {
    /// Reversed so that a `BinaryHeap<TimerEntry>` pops the earliest
    /// deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending deadlines served by one background thread.
struct DeadlineQueue {
    heap: Mutex<BinaryHeap<TimerEntry>>,
    changed: Condvar,
}

static QUEUE: OnceLock<Option<Arc<DeadlineQueue>>> = OnceLock::new();

/// Returns the process-wide queue, starting its thread on first use.
///
/// If the thread cannot be spawned, deadlines are still honoured
/// whenever a token is queried, but parked waiters are not woken.
fn queue() -> Option<&'static Arc<DeadlineQueue>> {
    QUEUE
        .get_or_init(|| {
            let queue = Arc::new(DeadlineQueue {
                heap: Mutex::new(BinaryHeap::new()),
                changed: Condvar::new(),
            });

            let worker = queue.clone();
            match thread::Builder::new()
                .name("singlepoll-deadline".into())
                .spawn(move || worker.run())
            {
                Ok(_) => Some(queue),
                Err(err) => {
                    log::warn!("could not start deadline thread: {err}");
                    None
                }
            }
        })
        .as_ref()
}

/// Schedules `token` to be cancelled at `deadline`.
///
/// Entries whose token is already gone are dropped on the way.
pub(super) fn schedule(deadline: Instant, token: Weak<Inner>) {
    let Some(queue) = queue() else {
        return;
    };

    let mut heap = queue.lock();
    heap.retain(|e| e.token.strong_count() > 0);

    let earliest = heap.peek().is_none_or(|e| deadline < e.deadline);
    heap.push(TimerEntry { deadline, token });
    drop(heap);

    if earliest {
        queue.changed.notify_one();
    }
}

impl DeadlineQueue {
    fn lock(&self) -> MutexGuard<'_, BinaryHeap<TimerEntry>> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) {
        let mut heap = self.lock();

        loop {
            let now = Instant::now();
            let next = heap.peek().map(|e| e.deadline);

            match next {
                None => {
                    heap = self
                        .changed
                        .wait(heap)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) if deadline <= now => {
                    let expired = heap.pop();
                    drop(heap);

                    if let Some(token) = expired.and_then(|e| e.token.upgrade()) {
                        token.cancel(CancelReason::DeadlineExceeded);
                    }

                    heap = self.lock();
                }
                Some(deadline) => {
                    heap = self
                        .changed
                        .wait_timeout(heap, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0);
                }
            }
        }
    }
}
