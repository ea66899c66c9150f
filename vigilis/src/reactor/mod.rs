//! Readiness reactor.
//!
//! This module implements the I/O half of the event loop:
//! - [`Interest`] masks shared by callers and backends,
//! - the [`Reactor`] trait implemented once per OS facility,
//! - the [`Poller`], which owns the registration table and dispatches
//!   readiness to callbacks.
//!
//! Most users only reach the poller through an
//! [`EventLoop`](crate::EventLoop) and the streams built on it.

mod event;
mod interest;

pub(crate) mod poller;

pub use event::Event;
pub use interest::Interest;
pub use poller::platform::RawFd;
pub use poller::{BackendHint, Poller, Reactor};
