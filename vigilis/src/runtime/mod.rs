//! The event loop.
//!
//! This module contains the single-threaded loop that drives everything
//! else in the crate:
//! - a FIFO queue of posted tasks,
//! - the set of [`Timer`](crate::time::Timer)s,
//! - one [`Poller`](crate::Poller) for I/O readiness.
//!
//! A loop is created with [`EventLoop::new`] or through a
//! [`LoopBuilder`], and driven with [`EventLoop::tick`] or
//! [`EventLoop::run`].

mod builder;
mod event_loop;

pub use builder::LoopBuilder;
pub use event_loop::{EventLoop, LoopOptions};
