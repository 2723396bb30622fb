//! Multiplexer lifecycle and caller-facing handles.
//!
//! This module contains:
//! - [`Multiplexer`](core::Multiplexer), which owns the worker thread,
//! - [`Handle`](handle::Handle), the cheap clone callers wait through,
//! - the builder used to configure a multiplexer,
//! - the process-wide instance behind `init`/`shutdown`,
//! - a minimal `block_on` for synchronous callers.

pub(crate) mod block_on;
pub(crate) mod builder;
pub(crate) mod core;
pub(crate) mod global;
pub(crate) mod handle;
