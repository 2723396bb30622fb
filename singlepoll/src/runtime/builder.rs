use super::core::Multiplexer;
use crate::error::WaitError;

/// Default number of kernel events collected per wake.
const DEFAULT_EVENT_CAPACITY: usize = 128;

/// Default name of the worker thread.
const DEFAULT_THREAD_NAME: &str = "singlepoll-worker";

/// Builder for configuring and starting a [`Multiplexer`].
///
/// # Examples
///
/// ```rust,ignore
/// let multiplexer = MultiplexerBuilder::new()
///     .event_capacity(256)
///     .thread_name("edge-poller")
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct MultiplexerBuilder {
    /// Maximum number of events handled per `epoll_wait`.
    event_capacity: usize,

    /// Name given to the worker thread.
    thread_name: String,
}

impl MultiplexerBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }

    /// Sets how many readiness events one worker wake can process.
    ///
    /// More ready descriptors than this are simply picked up on the
    /// next wake.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn event_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "event_capacity must be > 0");

        self.event_capacity = n;
        self
    }

    /// Sets the name of the worker thread.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Creates the epoll instance and the doorbell, and starts the worker.
    ///
    /// Any failure is reported as [`WaitError::RegistrationFailed`].
    pub fn build(self) -> Result<Multiplexer, WaitError> {
        Multiplexer::start(self.event_capacity, self.thread_name)
    }
}

impl Default for MultiplexerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
