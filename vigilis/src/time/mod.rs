//! Time sources, deadlines and loop-driven timers.
//!
//! This module provides:
//! - [`now_ms`] and [`monotonic_ms`] clocks,
//! - [`Deadline`] arithmetic over the monotonic clock,
//! - [`Timer`], one-shot and periodic callbacks fired by an
//!   [`EventLoop`](crate::EventLoop).

mod clock;
mod deadline;
mod timer;

#[doc(inline)]
pub use clock::{monotonic_ms, now_ms};

#[doc(inline)]
pub use deadline::Deadline;

#[doc(inline)]
pub use timer::Timer;
