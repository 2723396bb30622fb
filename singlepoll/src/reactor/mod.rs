//! Readiness worker and the futures that talk to it.
//!
//! The reactor owns the single epoll instance and the registration
//! table on a dedicated thread. It is responsible for:
//! - adding and removing descriptors on behalf of waiters,
//! - resolving each registration exactly once,
//! - resolving everything with `Shutdown` when it stops.
//!
//! Waiters never touch epoll or the table; they communicate with the
//! reactor through commands and a doorbell.

mod command;
mod core;
pub(crate) mod event;
mod registration;

pub(crate) mod future;
pub(crate) mod poller;

pub(crate) use command::Command;
pub(crate) use self::core::{Reactor, ReactorHandle};
