use super::unix::{sys_eventfd_read, sys_eventfd_write};
use crate::error::WaitError;

use std::fmt;
use std::ops::BitOr;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::{PoisonError, RwLock};

/// Readiness a caller is waiting for.
///
/// Combine with `|`:
///
/// ```rust
/// use singlepoll::Interest;
///
/// let both = Interest::READABLE | Interest::WRITABLE;
/// assert!(both.is_readable() && both.is_writable());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interest {
    read: bool,
    write: bool,
}

impl Interest {
    /// Wait until the descriptor can be read without blocking.
    pub const READABLE: Interest = Interest {
        read: true,
        write: false,
    };

    /// Wait until the descriptor can be written without blocking.
    pub const WRITABLE: Interest = Interest {
        read: false,
        write: true,
    };

    /// Wait until the descriptor is readable or writable.
    pub const BOTH: Interest = Interest {
        read: true,
        write: true,
    };

    /// Builds an interest from raw flags.
    ///
    /// An interest with neither flag set is accepted here, but any wait
    /// using it fails with [`WaitError::UnsupportedMode`].
    pub const fn new(read: bool, write: bool) -> Self {
        Self { read, write }
    }

    /// Parses a mode string made of `r` and `w` characters.
    ///
    /// `"r"`, `"w"`, `"rw"` and `"wr"` are accepted; an empty string or
    /// any other character yields [`WaitError::UnsupportedMode`].
    pub fn from_mode(mode: &str) -> Result<Self, WaitError> {
        let mut interest = Interest::new(false, false);

        for c in mode.chars() {
            match c {
                'r' => interest.read = true,
                'w' => interest.write = true,
                _ => return Err(WaitError::UnsupportedMode),
            }
        }

        if interest.is_empty() {
            return Err(WaitError::UnsupportedMode);
        }

        Ok(interest)
    }

    pub const fn is_readable(self) -> bool {
        self.read
    }

    pub const fn is_writable(self) -> bool {
        self.write
    }

    pub(crate) const fn is_empty(self) -> bool {
        !self.read && !self.write
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest {
            read: self.read || rhs.read,
            write: self.write || rhs.write,
        }
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.read, self.write) {
            (true, true) => f.write_str("Interest(rw)"),
            (true, false) => f.write_str("Interest(r)"),
            (false, true) => f.write_str("Interest(w)"),
            (false, false) => f.write_str("Interest(-)"),
        }
    }
}

/// Signalable descriptor that interrupts a blocking poll.
///
/// The doorbell owns its `eventfd`. Any thread may [`ring`](Self::ring)
/// it; the owning poller [`release`](Self::release)s the descriptor when
/// it is torn down. Ringing a released doorbell does nothing, so a late
/// ring can never land on a recycled descriptor number.
pub(crate) struct Doorbell {
    fd: RwLock<Option<OwnedFd>>,
}

impl Doorbell {
    pub(crate) fn new(fd: OwnedFd) -> Self {
        Self {
            fd: RwLock::new(Some(fd)),
        }
    }

    /// Interrupts the poller owning this doorbell.
    pub(crate) fn ring(&self) {
        let guard = self.fd.read().unwrap_or_else(PoisonError::into_inner);

        if let Some(fd) = guard.as_ref() {
            if let Err(err) = sys_eventfd_write(fd.as_raw_fd(), 1) {
                log::trace!("doorbell ring failed: {err}");
            }
        }
    }

    /// Resets the counter after the poller observed a ring.
    pub(crate) fn drain(&self) {
        let guard = self.fd.read().unwrap_or_else(PoisonError::into_inner);

        if let Some(fd) = guard.as_ref() {
            let _ = sys_eventfd_read(fd.as_raw_fd());
        }
    }

    /// Closes the underlying descriptor. Later rings are no-ops.
    pub(crate) fn release(&self) {
        let mut guard = self.fd.write().unwrap_or_else(PoisonError::into_inner);
        guard.take();
    }

    #[cfg(test)]
    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        let guard = self.fd.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(AsRawFd::as_raw_fd)
    }
}
