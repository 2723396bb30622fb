//! Small internal data structures.
//!
//! Currently a [`Slab`] used by cancellation tokens to key the wakers
//! of the futures waiting on them.

mod slab;

pub(crate) use slab::Slab;
