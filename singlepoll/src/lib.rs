//! # Singlepoll
//!
//! **Singlepoll** multiplexes readiness waits for many callers onto a single
//! Linux `epoll` instance driven by one dedicated worker thread.
//!
//! Callers hand in a raw, non-blocking descriptor, the readiness they need
//! and a [`CancellationToken`]. Each request resolves exactly once with one
//! of:
//!
//! - [`Outcome::Ready`] when the descriptor is readable or writable,
//! - [`Outcome::Cancelled`] when the token fires first,
//! - a [`WaitError`] when the wait cannot be served.
//!
//! The worker is the only code that touches the epoll instance and the
//! registration table. Requests reach it over a channel, and an `eventfd`
//! doorbell interrupts its `epoll_wait` whenever a command is queued, so
//! it never polls on a timer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use singlepoll::{CancellationToken, Interest, Multiplexer, Outcome};
//! use std::net::TcpStream;
//! use std::os::fd::AsRawFd;
//! use std::time::Duration;
//!
//! let multiplexer = Multiplexer::new()?;
//! let handle = multiplexer.handle();
//!
//! let stream = TcpStream::connect("127.0.0.1:8080")?;
//! stream.set_nonblocking(true)?;
//!
//! let cancel = CancellationToken::timeout(Duration::from_secs(2));
//! match handle.wait_blocking(stream.as_raw_fd(), Interest::READABLE, &cancel)? {
//!     Outcome::Ready => println!("data is waiting"),
//!     Outcome::Cancelled => println!("gave up"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`Handle::wait`] returns a future, so the same call can be `.await`ed
//! from any executor. A process-wide instance is also available through
//! [`init`], [`poll_park`] and [`shutdown`].
//!
//! ## Modules
//!
//! - [`cancel`]: Cancellation tokens with parent/child links and deadlines
//! - [`dedicated`]: A blocking poller bound to a single descriptor
//!
//! Logging goes through the [`log`](https://docs.rs/log) facade; no logger
//! is installed by this crate.

mod error;
mod reactor;
mod runtime;
mod utils;

pub mod cancel;
pub mod dedicated;

pub use cancel::{CancelReason, CancellationToken};
pub use dedicated::DedicatedPoller;
pub use error::WaitError;
pub use reactor::future::{Outcome, Wait};
pub use reactor::poller::common::Interest;
pub use runtime::block_on::block_on;
pub use runtime::builder::MultiplexerBuilder;
pub use runtime::core::Multiplexer;
pub use runtime::global::{init, poll_park, shutdown};
pub use runtime::handle::Handle;

pub use singlepoll_macros::test;
