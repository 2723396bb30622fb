//! Errors surfaced to waiters.

use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;

use thiserror::Error;

/// Failure kinds that cross the multiplexer boundary.
///
/// A cancelled wait is not an error; it resolves to
/// [`Outcome::Cancelled`](crate::Outcome::Cancelled).
///
/// `WaitError` is `Clone` so a single startup failure can be handed to
/// every caller of the process-wide instance.
#[derive(Debug, Clone, Error)]
pub enum WaitError {
    /// The requested interest is empty, or a mode string contained
    /// something other than `r` and `w`.
    #[error("only 'r' and 'w' modes are supported")]
    UnsupportedMode,

    /// The descriptor already has a pending wait.
    #[error("descriptor {fd} already has a pending wait")]
    AlreadyPending { fd: RawFd },

    /// The kernel refused to track the descriptor, or the poller itself
    /// could not be created.
    #[error("registration failed: {0}")]
    RegistrationFailed(#[source] Arc<io::Error>),

    /// The multiplexer is shutting down or has shut down.
    #[error("multiplexer has shut down")]
    Shutdown,
}

impl WaitError {
    /// Wraps an OS error as [`WaitError::RegistrationFailed`].
    pub(crate) fn registration(err: io::Error) -> Self {
        Self::RegistrationFailed(Arc::new(err))
    }

    /// Returns `true` for [`WaitError::Shutdown`].
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    /// Returns the underlying OS error, if any.
    pub fn os_error(&self) -> Option<&io::Error> {
        match self {
            Self::RegistrationFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for WaitError {
    fn from(err: io::Error) -> Self {
        Self::registration(err)
    }
}
