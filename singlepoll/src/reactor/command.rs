use super::registration::Registration;

use std::os::fd::RawFd;
use std::sync::mpsc::Sender;

/// Control messages sent to the readiness worker.
pub(crate) enum Command {
    /// Start tracking `fd` for the given registration.
    Register {
        fd: RawFd,
        registration: Registration,
    },

    /// Drop the registration of `fd`, if it is still the one tagged `id`.
    Deregister { fd: RawFd, id: u64 },

    /// Report the descriptors currently registered.
    Snapshot { reply: Sender<Vec<RawFd>> },

    /// Resolve everything with `Shutdown` and stop the worker.
    Shutdown,
}
