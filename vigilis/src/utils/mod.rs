//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the reactor.
//! In particular, it exposes a generation-tagged [`Slab`] used as the
//! poller's registration table.

mod slab;

pub(crate) use slab::{Key, Slab};
