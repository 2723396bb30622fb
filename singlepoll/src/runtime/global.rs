use super::core::Multiplexer;
use super::handle::Handle;
use crate::cancel::CancellationToken;
use crate::error::WaitError;
use crate::reactor::future::Outcome;
use crate::reactor::poller::Interest;

use std::os::fd::RawFd;
use std::sync::OnceLock;

/// The process-wide multiplexer, or the error it failed to start with.
static GLOBAL: OnceLock<Result<Multiplexer, WaitError>> = OnceLock::new();

fn instance() -> Result<&'static Multiplexer, WaitError> {
    GLOBAL
        .get_or_init(|| {
            let started = Multiplexer::new();
            match &started {
                Ok(_) => log::debug!("process-wide multiplexer started"),
                Err(err) => log::warn!("process-wide multiplexer failed to start: {err}"),
            }
            started
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// Starts the process-wide multiplexer if needed and returns a handle to it.
///
/// Calling this more than once is harmless. If the first start failed,
/// the same error is returned to every caller and no new attempt is made.
pub fn init() -> Result<Handle, WaitError> {
    instance().map(Multiplexer::handle)
}

/// Shuts the process-wide multiplexer down and joins its worker.
///
/// Every outstanding wait resolves with [`WaitError::Shutdown`], as does
/// every later [`poll_park`]. The instance is not restarted.
pub fn shutdown() {
    if let Some(Ok(multiplexer)) = GLOBAL.get() {
        multiplexer.shutdown();
    }
}

/// Blocks until `fd` is ready for `mode` (`"r"`, `"w"` or `"rw"`) or
/// `cancel` fires, using the process-wide multiplexer.
///
/// The mode is validated before the multiplexer is started.
pub fn poll_park(
    fd: RawFd,
    mode: &str,
    cancel: &CancellationToken,
) -> Result<Outcome, WaitError> {
    let interest = Interest::from_mode(mode)?;
    init()?.wait_blocking(fd, interest, cancel)
}
