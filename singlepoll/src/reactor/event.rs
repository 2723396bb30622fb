use super::poller::Interest;

use std::os::fd::RawFd;

/// A readiness event reported by the poller.
///
/// Error and hang-up conditions are folded into both flags: a waiter
/// must be woken so its next operation observes the failure.
pub(crate) struct Event {
    /// Descriptor the kernel reported.
    pub(crate) fd: RawFd,

    /// Indicates that the file descriptor is readable.
    pub(crate) readable: bool,

    /// Indicates that the file descriptor is writable.
    pub(crate) writable: bool,
}

impl Event {
    /// Returns `true` if this event satisfies at least one side of `interest`.
    pub(crate) fn satisfies(&self, interest: Interest) -> bool {
        (self.readable && interest.is_readable()) || (self.writable && interest.is_writable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(readable: bool, writable: bool) -> Event {
        Event {
            fd: 3,
            readable,
            writable,
        }
    }

    #[test]
    fn matches_requested_side_only() {
        assert!(event(true, false).satisfies(Interest::READABLE));
        assert!(!event(true, false).satisfies(Interest::WRITABLE));
        assert!(event(false, true).satisfies(Interest::WRITABLE));
        assert!(event(false, true).satisfies(Interest::BOTH));
        assert!(!event(false, false).satisfies(Interest::BOTH));
    }
}
