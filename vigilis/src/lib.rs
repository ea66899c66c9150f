//! # Vigilis
//!
//! **Vigilis** is an embeddable, single-threaded I/O reactor. It multiplexes
//! OS readiness notifications across sockets, files and pipes, and exposes
//! them as buffered, callback-driven streams.
//!
//! Unlike a general-purpose async runtime, Vigilis has no executor and no
//! wakers. Everything runs on the thread that drives the loop:
//!
//! - an [`EventLoop`] with a FIFO task queue, timers and one [`Poller`],
//! - one [`Reactor`] backend per OS facility (`epoll`, `kqueue`, `poll`,
//!   `WSAPoll`), chosen when the loop is built,
//! - [`Stream`]s over TCP, UDP, files and pipes,
//! - one-shot and periodic [`Timer`]s,
//! - a single-assignment [`Future`] with continuations, and a
//!   [`CancelToken`] for cooperative cleanup.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use vigilis::{EventLoop, Stream};
//!
//! let event_loop = EventLoop::new()?;
//! let peers: Rc<RefCell<Vec<Stream>>> = Rc::default();
//!
//! let server = Stream::open_tcp(&event_loop)?;
//! server.bind(Some("127.0.0.1"), 0)?;
//! server.listen(16)?;
//!
//! let accepted = peers.clone();
//! server.on_connection(move |listener| {
//!     while let Ok(peer) = listener.accept() {
//!         let _ = peer.write(b"hello\n");
//!         accepted.borrow_mut().push(peer);
//!     }
//! })?;
//!
//! event_loop.run()?;
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Process-wide settings and build features
//! - [`observe`] - Trace and metric hooks
//! - [`stream`] - Streams and pipe helpers
//! - [`time`] - Clocks, deadlines and timers
//!
//! Logging goes through [`tracing`]; install a subscriber to see it.

mod buffer;
mod cancel;
mod error;
mod future;
mod reactor;
mod runtime;
mod utils;

pub mod config;
pub mod observe;
pub mod stream;
pub mod time;

pub use buffer::Buffer;
pub use cancel::CancelToken;
pub use error::{Error, ErrorKind, Result};
pub use future::{Future, FutureState};
pub use reactor::{BackendHint, Event, Interest, Poller, RawFd, Reactor};
pub use runtime::{EventLoop, LoopBuilder, LoopOptions};
pub use stream::{Stream, StreamKind};
pub use time::{Deadline, Timer};
