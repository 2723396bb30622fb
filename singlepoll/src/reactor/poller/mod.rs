//! Kernel polling abstraction.
//!
//! This module wraps the Linux `epoll` facility used by the readiness
//! worker and by [`DedicatedPoller`](crate::DedicatedPoller).
//!
//! The poller is used to:
//! - register descriptors with a read and/or write interest,
//! - block indefinitely until one of them becomes ready,
//! - be interrupted from another thread through its [`Doorbell`].

pub(crate) mod common;

#[cfg(target_os = "linux")]
mod epoll;

pub(crate) use common::{Doorbell, Interest};

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(target_os = "linux")]
pub(crate) mod unix;

#[cfg(not(target_os = "linux"))]
compile_error!("singlepoll currently supports Linux (epoll + eventfd) only");
