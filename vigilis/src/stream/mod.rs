//! Buffered, callback-driven duplex streams.
//!
//! A [`Stream`] wraps one non-blocking descriptor (a TCP or UDP socket, a
//! file or a pipe end) registered with its loop's poller. Readiness is
//! routed through a single dispatcher per stream, which performs the
//! actual reads and writes and reports to user callbacks:
//!
//! - the data callback installed by [`Stream::read_start`] receives each
//!   chunk read, then `Err(Closed)` once at end-of-file,
//! - the writable callback passed to [`Stream::write_with`] fires once the
//!   output buffer has fully drained,
//! - the connection callback installed by [`Stream::on_connection`] fires
//!   when a listening socket has a connection to accept.
//!
//! Would-block and interrupted results are never errors: the dispatcher
//! waits for the next readiness notification. Any other OS failure marks
//! the stream failed and is reported to the callbacks.

mod pipe;
mod socket;

#[cfg(unix)]
mod file;

pub use pipe::{pipe, pipe_through};

#[cfg(unix)]
pub use file::{FileMode, pipe_pair};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::reactor::poller::platform;
use crate::reactor::{Interest, RawFd};
use crate::runtime::EventLoop;
use crate::time::Timer;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;
use std::rc::{Rc, Weak};

/// Initial capacity of each stream buffer.
const BUFFER_CAPACITY: usize = 8192;

/// Upper bound on the bytes taken by a single read.
const READ_CHUNK: usize = 16 * 1024;

/// The kind of descriptor behind a [`Stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Tcp,
    Udp,
    File,
    Pipe,
}

impl StreamKind {
    fn is_socket(self) -> bool {
        matches!(self, StreamKind::Tcp | StreamKind::Udp)
    }
}

type DataCallback = Rc<RefCell<dyn FnMut(&Stream, Result<&[u8]>)>>;
type WritableCallback = Box<dyn FnOnce(&Stream, Result<()>)>;
type ConnectionCallback = Rc<RefCell<dyn FnMut(&Stream)>>;

pub(crate) struct StreamInner {
    event_loop: EventLoop,
    kind: StreamKind,

    /// `None` once closed.
    fd: Cell<Option<RawFd>>,

    /// Interest asked for by the owner through pause/resume.
    requested: Cell<Interest>,

    /// Interest currently installed in the poller.
    armed: Cell<Interest>,

    listening: Cell<bool>,
    connecting: Cell<bool>,
    eof: Cell<bool>,
    failed: Cell<bool>,

    /// Holds the chunk being delivered to the data callback.
    inbuf: RefCell<Buffer>,

    /// Bytes accepted by `write` and not yet taken by the OS.
    outbuf: RefCell<Buffer>,

    on_data: RefCell<Option<DataCallback>>,
    on_writable: RefCell<Option<WritableCallback>>,
    on_connection: RefCell<Option<ConnectionCallback>>,

    write_high_watermark: Cell<Option<usize>>,

    /// Fails a pending connect once the loop's default timeout elapses.
    connect_timer: RefCell<Option<Timer>>,
}

/// A non-blocking, buffered duplex endpoint bound to an [`EventLoop`].
///
/// `Stream` is a cheap, clonable handle. The descriptor is owned by the
/// stream: [`close`](Self::close) releases it, and so does dropping the
/// last handle of a stream that was never closed.
///
/// # Examples
///
/// ```rust,ignore
/// let client = Stream::open_tcp(&event_loop)?;
/// client.connect("127.0.0.1", port)?;
/// client.read_start(|_, chunk| {
///     if let Ok(bytes) = chunk {
///         println!("{} bytes", bytes.len());
///     }
/// })?;
/// client.write(b"ping")?;
/// ```
#[derive(Clone)]
pub struct Stream {
    inner: Rc<StreamInner>,
}

impl Stream {
    /// Wraps an open, non-blocking descriptor and registers it with the
    /// loop's poller. The descriptor is closed if registration fails.
    pub(crate) fn from_fd(
        event_loop: &EventLoop,
        kind: StreamKind,
        fd: RawFd,
    ) -> Result<Stream> {
        let inbuf = Buffer::with_capacity(BUFFER_CAPACITY);
        let outbuf = Buffer::with_capacity(BUFFER_CAPACITY);

        let (inbuf, outbuf) = match (inbuf, outbuf) {
            (Ok(inbuf), Ok(outbuf)) => (inbuf, outbuf),
            (Err(err), _) | (_, Err(err)) => {
                let _ = platform::sys_close(fd);
                return Err(err);
            }
        };

        let inner = Rc::new(StreamInner {
            event_loop: event_loop.clone(),
            kind,
            fd: Cell::new(Some(fd)),
            requested: Cell::new(Interest::READ | Interest::WRITE),
            armed: Cell::new(Interest::NONE),
            listening: Cell::new(false),
            connecting: Cell::new(false),
            eof: Cell::new(false),
            failed: Cell::new(false),
            inbuf: RefCell::new(inbuf),
            outbuf: RefCell::new(outbuf),
            on_data: RefCell::new(None),
            on_writable: RefCell::new(None),
            on_connection: RefCell::new(None),
            write_high_watermark: Cell::new(None),
            connect_timer: RefCell::new(None),
        });

        let weak: Weak<StreamInner> = Rc::downgrade(&inner);
        let registered = event_loop.poller().add(fd, Interest::NONE, move |_, ready| {
            if let Some(inner) = weak.upgrade() {
                Stream { inner }.dispatch(ready);
            }
        });

        if let Err(err) = registered {
            inner.fd.set(None);
            let _ = platform::sys_close(fd);
            return Err(err);
        }

        tracing::debug!(fd = ?fd, kind = ?kind, "stream opened");

        Ok(Stream { inner })
    }

    /// Installs the data callback and starts reading.
    ///
    /// The callback receives `Ok(bytes)` for every chunk read (at most
    /// 16 KiB), `Err(Error::Closed)` once at end-of-file, and the error
    /// of a fatal failure. Bytes are not queued: whatever the callback
    /// does not keep is gone. Installing a callback replaces the previous
    /// one and requests read interest again.
    pub fn read_start<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(&Stream, Result<&[u8]>) + 'static,
    {
        self.ensure_open()?;

        let callback: DataCallback = Rc::new(RefCell::new(callback));
        let old = self.inner.on_data.replace(Some(callback));
        drop(old);

        self.inner
            .requested
            .set(self.inner.requested.get() | Interest::READ);
        self.update_interest()
    }

    /// Removes the data callback and drops to write-only interest.
    pub fn read_stop(&self) -> Result<()> {
        self.ensure_open()?;

        let old = self.inner.on_data.take();
        drop(old);

        self.inner
            .requested
            .set(self.inner.requested.get().remove(Interest::READ));
        self.update_interest()
    }

    /// Queues `data` for writing.
    ///
    /// A writable callback already pending from an earlier
    /// [`write_with`](Self::write_with) is kept.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the stream is closed,
    /// - [`Error::Closed`] if the stream has failed,
    /// - [`Error::WouldBlock`] if the write would exceed the write high
    ///   watermark; nothing is queued in that case.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.enqueue(&[data], None)
    }

    /// Queues `data` and installs `callback` to run once the output buffer
    /// has fully drained.
    ///
    /// Only one writable callback is pending at a time: installing a new
    /// one drops the previous one without calling it.
    pub fn write_with<F>(&self, data: &[u8], callback: F) -> Result<()>
    where
        F: FnOnce(&Stream, Result<()>) + 'static,
    {
        self.enqueue(&[data], Some(Box::new(callback)))
    }

    /// Queues several slices, in order, as one write.
    pub fn writev(&self, chunks: &[&[u8]]) -> Result<()> {
        self.enqueue(chunks, None)
    }

    /// Like [`writev`](Self::writev), with a writable callback.
    pub fn writev_with<F>(&self, chunks: &[&[u8]], callback: F) -> Result<()>
    where
        F: FnOnce(&Stream, Result<()>) + 'static,
    {
        self.enqueue(chunks, Some(Box::new(callback)))
    }

    fn enqueue(&self, chunks: &[&[u8]], callback: Option<WritableCallback>) -> Result<()> {
        self.ensure_open()?;
        if self.inner.failed.get() {
            return Err(Error::Closed);
        }

        let total = chunks
            .iter()
            .try_fold(0usize, |acc, chunk| acc.checked_add(chunk.len()))
            .ok_or(Error::OutOfRange("write length overflow"))?;

        {
            let mut out = self.inner.outbuf.borrow_mut();

            if let Some(mark) = self.inner.write_high_watermark.get() {
                if out.len().saturating_add(total) > mark {
                    return Err(Error::WouldBlock);
                }
            }

            for chunk in chunks {
                out.append(chunk)?;
            }
        }

        if let Some(callback) = callback {
            let old = self.inner.on_writable.replace(Some(callback));
            if old.is_some() {
                tracing::debug!(fd = ?self.fd(), "pending writable callback replaced");
            }
            drop(old);
        }

        self.update_interest()
    }

    /// Limits how many bytes may wait in the output buffer.
    ///
    /// `None` removes the limit.
    pub fn set_write_high_watermark(&self, limit: Option<usize>) {
        self.inner.write_high_watermark.set(limit);
    }

    pub fn write_high_watermark(&self) -> Option<usize> {
        self.inner.write_high_watermark.get()
    }

    /// Stops read notifications while keeping buffered data and callbacks.
    pub fn pause(&self) -> Result<()> {
        self.ensure_open()?;
        self.inner.requested.set(Interest::WRITE);
        self.update_interest()
    }

    /// Undoes [`pause`](Self::pause).
    pub fn resume(&self) -> Result<()> {
        self.ensure_open()?;
        self.inner.requested.set(Interest::READ | Interest::WRITE);
        self.update_interest()
    }

    /// Interest requested by the owner: read and write, or write only
    /// while paused or after [`read_stop`](Self::read_stop).
    ///
    /// The poller is only armed for the part of it that currently has a
    /// consumer.
    pub fn interest(&self) -> Interest {
        self.inner.requested.get()
    }

    /// Size of the chunk being delivered to the data callback; zero
    /// outside of it.
    pub fn inbuf_len(&self) -> usize {
        self.inner.inbuf.borrow().len()
    }

    /// Bytes queued and not yet written.
    pub fn outbuf_len(&self) -> usize {
        self.inner.outbuf.borrow().len()
    }

    pub fn kind(&self) -> StreamKind {
        self.inner.kind
    }

    /// The underlying descriptor, or `None` once closed.
    pub fn fd(&self) -> Option<RawFd> {
        self.inner.fd.get()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.fd.get().is_none()
    }

    /// Whether end-of-file has been read.
    pub fn is_eof(&self) -> bool {
        self.inner.eof.get()
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    /// Deregisters and closes the descriptor.
    ///
    /// Pending callbacks are dropped without being called, and unwritten
    /// output is discarded.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if the stream is already closed.
    pub fn close(&self) -> Result<()> {
        let fd = self
            .inner
            .fd
            .take()
            .ok_or(Error::InvalidState("stream already closed"))?;

        self.inner.event_loop.poller().remove(fd);
        self.inner.armed.set(Interest::NONE);
        self.cancel_connect_timer();

        let callbacks = (
            self.inner.on_data.take(),
            self.inner.on_writable.take(),
            self.inner.on_connection.take(),
        );
        drop(callbacks);

        self.inner.outbuf.borrow_mut().clear();

        tracing::debug!(fd = ?fd, kind = ?self.inner.kind, "stream closed");

        platform::sys_close(fd).map_err(Error::Io)
    }

    pub(crate) fn ensure_open(&self) -> Result<RawFd> {
        self.inner
            .fd
            .get()
            .ok_or(Error::InvalidState("stream is closed"))
    }

    /// Interest the poller must watch for, derived from the stream state.
    fn effective_interest(&self) -> Interest {
        let inner = &self.inner;
        if inner.failed.get() || inner.fd.get().is_none() {
            return Interest::NONE;
        }

        let requested = inner.requested.get();
        let mut interest = Interest::NONE;

        let has_reader = if inner.listening.get() {
            inner.on_connection.borrow().is_some()
        } else {
            inner.on_data.borrow().is_some() && !inner.eof.get()
        };
        if requested.is_readable() && has_reader {
            interest |= Interest::READ;
        }

        let has_output =
            !inner.outbuf.borrow().is_empty() || inner.on_writable.borrow().is_some();
        if inner.connecting.get() || (requested.is_writable() && has_output) {
            interest |= Interest::WRITE;
        }

        interest
    }

    pub(crate) fn update_interest(&self) -> Result<()> {
        let Some(fd) = self.inner.fd.get() else {
            return Ok(());
        };

        let interest = self.effective_interest();
        if interest != self.inner.armed.get() {
            self.inner.event_loop.poller().modify(fd, interest)?;
            self.inner.armed.set(interest);
        }

        Ok(())
    }

    /// Poller callback: turns readiness into reads, writes and callbacks.
    fn dispatch(&self, mut ready: Interest) {
        let Some(fd) = self.inner.fd.get() else {
            return;
        };

        if self.inner.connecting.get() && (ready.is_writable() || ready.is_error()) {
            self.inner.connecting.set(false);
            self.cancel_connect_timer();

            if let Err(err) = platform::sys_get_socket_error(fd) {
                self.fail(Error::Io(err));
                return;
            }

            tracing::debug!(fd = ?fd, "connected");
        } else if ready.is_error() {
            if self.inner.kind.is_socket() {
                if let Err(err) = platform::sys_get_socket_error(fd) {
                    self.fail(Error::Io(err));
                    return;
                }
            }

            // Let the next read or write surface the failure.
            ready |= self.inner.armed.get();
        }

        if self.inner.listening.get() {
            if ready.is_readable() {
                self.notify_connection();
            }
        } else {
            if ready.is_readable() {
                self.read_ready(fd);
            }

            if ready.is_writable() && self.is_live() {
                self.write_ready(fd);
            }
        }

        if let Err(err) = self.update_interest() {
            tracing::warn!(fd = ?fd, error = %err, "failed to update stream interest");
        }
    }

    fn cancel_connect_timer(&self) {
        let timer = self.inner.connect_timer.take();
        if let Some(timer) = timer {
            timer.stop();
        }
    }

    /// Whether the stream is still open and has not failed.
    fn is_live(&self) -> bool {
        self.inner.fd.get().is_some() && !self.inner.failed.get()
    }

    fn notify_connection(&self) {
        let callback = self.inner.on_connection.borrow().clone();
        if let Some(callback) = callback {
            if let Ok(mut callback) = callback.try_borrow_mut() {
                (&mut *callback)(self);
            }
        }
    }

    fn read_ready(&self, fd: RawFd) {
        let Some(callback) = self.inner.on_data.borrow().clone() else {
            return;
        };
        if self.inner.eof.get() {
            return;
        }

        let mut chunk = [0u8; READ_CHUNK];
        match platform::sys_read(fd, &mut chunk) {
            Ok(0) => {
                self.inner.eof.set(true);
                tracing::debug!(fd = ?fd, "end of stream");

                if let Ok(mut callback) = callback.try_borrow_mut() {
                    (&mut *callback)(self, Err(Error::Closed));
                }
            }

            Ok(n) => {
                if let Err(err) = self.inner.inbuf.borrow_mut().append(&chunk[..n]) {
                    self.fail(err);
                    return;
                }

                if let Ok(mut callback) = callback.try_borrow_mut() {
                    let staged = self.inner.inbuf.borrow();
                    (&mut *callback)(self, Ok(staged.as_slice()));
                }

                self.inner.inbuf.borrow_mut().clear();
            }

            Err(err) => self.io_failure(err),
        }
    }

    fn write_ready(&self, fd: RawFd) {
        let pending = self.inner.outbuf.borrow().len();

        if pending > 0 {
            let written = {
                let out = self.inner.outbuf.borrow();
                platform::sys_write(fd, out.as_slice())
            };

            match written {
                Ok(n) => {
                    self.inner.outbuf.borrow_mut().consume(n);
                    tracing::trace!(fd = ?fd, written = n, left = pending - n, "flushed");
                }
                Err(err) => {
                    self.io_failure(err);
                    return;
                }
            }
        }

        if self.inner.outbuf.borrow().is_empty() {
            let callback = self.inner.on_writable.take();
            if let Some(callback) = callback {
                callback(self, Ok(()));
            }
        }
    }

    /// Classifies an OS error from a read or write.
    fn io_failure(&self, err: io::Error) {
        let err = Error::from(err);
        if err.is_retryable() {
            return;
        }

        self.fail(err);
    }

    /// Marks the stream failed and reports `err` to its callbacks.
    fn fail(&self, err: Error) {
        if self.inner.failed.replace(true) {
            return;
        }

        tracing::warn!(fd = ?self.fd(), kind = ?self.inner.kind, error = %err, "stream failed");

        let data = self.inner.on_data.borrow().clone();
        if let Some(callback) = data {
            if let Ok(mut callback) = callback.try_borrow_mut() {
                (&mut *callback)(self, Err(err.clone()));
            }
        }

        let writable = self.inner.on_writable.take();
        if let Some(callback) = writable {
            callback(self, Err(err));
        }

        if let Err(err) = self.update_interest() {
            tracing::warn!(fd = ?self.fd(), error = %err, "failed to withdraw stream interest");
        }
    }
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        if let Some(timer) = self.connect_timer.take() {
            timer.stop();
        }

        if let Some(fd) = self.fd.take() {
            self.event_loop.poller().remove(fd);
            let _ = platform::sys_close(fd);
            tracing::debug!(fd = ?fd, "stream dropped while open");
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("kind", &self.inner.kind)
            .field("fd", &self.inner.fd.get())
            .field("interest", &self.inner.requested.get())
            .field("armed", &self.inner.armed.get())
            .field("outbuf", &self.outbuf_len())
            .finish()
    }
}
