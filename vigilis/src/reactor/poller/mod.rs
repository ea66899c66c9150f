//! Platform-specific I/O poller abstraction.
//!
//! This module provides a unified interface over the readiness facilities
//! offered by the operating system:
//!
//! - `epoll` on Linux and Android,
//! - `kqueue` on macOS, iOS, FreeBSD, OpenBSD and DragonFly,
//! - `poll(2)` on every Unix,
//! - `WSAPoll` on Windows.
//!
//! Each facility is wrapped in a [`Reactor`] implementation that speaks
//! in descriptors and [`Interest`] masks. On top of it, [`Poller`] keeps
//! the registration table and dispatches readiness to callbacks.

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod kqueue;

#[cfg(unix)]
mod poll;

#[cfg(windows)]
mod wsapoll;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;

#[cfg(windows)]
pub(crate) mod windows;

#[cfg(windows)]
pub(crate) use windows as platform;

use self::platform::RawFd;
use crate::error::{Error, Result};
use crate::reactor::event::Event;
use crate::reactor::interest::Interest;
use crate::utils::{Key, Slab};

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::mem;
use std::rc::Rc;

/// Initial number of registration slots.
const INITIAL_SLOTS: usize = 64;

/// An OS readiness facility.
///
/// Implementations register descriptors for an [`Interest`] and report
/// readiness as normalized [`Event`]s. They are level-triggered: a
/// descriptor that stays ready is reported again on the next poll.
///
/// Custom implementations can be plugged into a [`Poller`] with
/// [`Poller::with_reactor`].
pub trait Reactor {
    /// Short name of the facility, such as `"epoll"`.
    fn name(&self) -> &'static str;

    /// Starts watching `fd` for `interest`.
    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;

    /// Replaces the interest of an already watched descriptor.
    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;

    /// Stops watching `fd`.
    fn remove(&mut self, fd: RawFd) -> io::Result<()>;

    /// Waits up to `timeout_ms` (`-1` blocks, `0` returns immediately) and
    /// appends ready descriptors to `events`.
    ///
    /// An interrupted wait is not an error and reports nothing.
    fn poll(&mut self, events: &mut Vec<Event>, timeout_ms: i32) -> io::Result<()>;
}

/// Preferred readiness facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendHint {
    /// The best facility of the current platform.
    #[default]
    Auto,
    Epoll,
    Kqueue,
    /// Windows. Served by the readiness-based `WSAPoll` facility.
    Iocp,
    /// Portable `poll(2)`.
    Poll,
}

impl BackendHint {
    /// Decodes a numeric hint: `0` auto, `1` epoll, `2` kqueue, `3` iocp, `4` poll.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(BackendHint::Auto),
            1 => Ok(BackendHint::Epoll),
            2 => Ok(BackendHint::Kqueue),
            3 => Ok(BackendHint::Iocp),
            4 => Ok(BackendHint::Poll),
            _ => Err(Error::Config("unknown poller backend code")),
        }
    }

    /// Whether this facility is compiled in for the current target.
    pub fn is_available(self) -> bool {
        match self {
            BackendHint::Auto => true,
            BackendHint::Epoll => cfg!(any(target_os = "linux", target_os = "android")),
            BackendHint::Kqueue => cfg!(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            )),
            BackendHint::Iocp => cfg!(windows),
            BackendHint::Poll => cfg!(unix),
        }
    }
}

/// Opens the facility named by `hint`.
fn open_backend(hint: BackendHint, max_events: usize) -> Result<Box<dyn Reactor>> {
    match hint {
        BackendHint::Auto => open_default(max_events),

        #[cfg(any(target_os = "linux", target_os = "android"))]
        BackendHint::Epoll => Ok(Box::new(epoll::Epoll::new(max_events).map_err(Error::Io)?)),

        #[cfg(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "dragonfly"
        ))]
        BackendHint::Kqueue => Ok(Box::new(
            kqueue::Kqueue::new(max_events).map_err(Error::Io)?,
        )),

        #[cfg(windows)]
        BackendHint::Iocp => Ok(Box::new(wsapoll::WsaPoll::new().map_err(Error::Io)?)),

        #[cfg(unix)]
        BackendHint::Poll => Ok(Box::new(poll::Poll::new())),

        _ => Err(Error::NotSupported(
            "poller backend unavailable on this platform",
        )),
    }
}

fn open_default(max_events: usize) -> Result<Box<dyn Reactor>> {
    if BackendHint::Epoll.is_available() {
        open_backend(BackendHint::Epoll, max_events)
    } else if BackendHint::Kqueue.is_available() {
        open_backend(BackendHint::Kqueue, max_events)
    } else if BackendHint::Iocp.is_available() {
        open_backend(BackendHint::Iocp, max_events)
    } else {
        open_backend(BackendHint::Poll, max_events)
    }
}

/// Callback invoked with the ready descriptor and the conditions that occurred.
type Handler = Rc<RefCell<dyn FnMut(RawFd, Interest)>>;

/// One entry of the registration table.
struct Registration {
    fd: RawFd,

    /// Interest requested by the owner.
    interest: Interest,

    handler: Handler,

    /// Whether the descriptor is currently installed in the OS facility.
    armed: bool,

    /// The facility refused the descriptor as permanently ready.
    always_ready: bool,
}

impl Registration {
    /// Always-ready with something to report: `wait` must not block.
    fn is_hot(&self) -> bool {
        self.always_ready && !self.interest.is_empty()
    }
}

struct PollerInner {
    reactor: Box<dyn Reactor>,

    /// Registration table.
    registry: Slab<Registration>,

    /// Descriptor to registration key.
    index: HashMap<RawFd, Key>,

    /// Reusable event buffer.
    events: Vec<Event>,

    /// Number of always-ready registrations with a non-empty interest.
    hot: usize,
}

/// Readiness multiplexer with callback dispatch.
///
/// A `Poller` is a cheap, clonable handle; clones share the same
/// registration table. It is single-threaded: handlers run on the thread
/// that calls [`Poller::wait`] and may freely add, modify or remove
/// registrations, including their own.
#[derive(Clone)]
pub struct Poller {
    inner: Rc<RefCell<PollerInner>>,
}

impl Poller {
    /// Opens a poller over the facility selected by `hint`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `max_events` is zero,
    /// - [`Error::NotSupported`] if the facility is not available here,
    /// - [`Error::Io`] if the facility cannot be created.
    pub fn new(hint: BackendHint, max_events: usize) -> Result<Self> {
        if max_events == 0 {
            return Err(Error::InvalidArgument("max_events must be > 0"));
        }

        let reactor = open_backend(hint, max_events)?;
        tracing::debug!(backend = reactor.name(), max_events, "poller opened");

        Ok(Self::with_reactor(reactor, max_events))
    }

    /// Builds a poller over a caller-supplied facility.
    pub fn with_reactor(reactor: Box<dyn Reactor>, max_events: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(PollerInner {
                reactor,
                registry: Slab::new(INITIAL_SLOTS),
                index: HashMap::new(),
                events: Vec::with_capacity(max_events.max(1)),
                hot: 0,
            })),
        }
    }

    /// Registers `fd` for `interest`; `handler` runs on readiness.
    ///
    /// An empty interest reserves the registration without arming the
    /// descriptor in the OS facility.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for an invalid descriptor,
    /// - [`Error::InvalidState`] if `fd` is already registered,
    /// - [`Error::Io`] if the OS facility rejects the descriptor.
    pub fn add<F>(&self, fd: RawFd, interest: Interest, handler: F) -> Result<()>
    where
        F: FnMut(RawFd, Interest) + 'static,
    {
        if !platform::is_valid_fd(fd) {
            return Err(Error::InvalidArgument("invalid descriptor"));
        }

        let mut inner = self.inner.borrow_mut();
        if inner.index.contains_key(&fd) {
            return Err(Error::InvalidState("descriptor already registered"));
        }

        let mut registration = Registration {
            fd,
            interest: Interest::NONE,
            handler: Rc::new(RefCell::new(handler)),
            armed: false,
            always_ready: false,
        };

        arm(inner.reactor.as_mut(), &mut registration, interest)?;
        if registration.is_hot() {
            inner.hot += 1;
        }

        let key = inner.registry.insert(registration);
        inner.index.insert(fd, key);

        tracing::debug!(fd = ?fd, interest = ?interest, slot = key.index(), "registered");

        Ok(())
    }

    /// Replaces the interest of a registered descriptor.
    ///
    /// An empty interest withdraws the descriptor from the OS facility but
    /// keeps its registration; a later non-empty interest re-arms it.
    pub fn modify(&self, fd: RawFd, interest: Interest) -> Result<()> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;

        let key = *inner
            .index
            .get(&fd)
            .ok_or(Error::InvalidState("descriptor not registered"))?;
        let registration = inner
            .registry
            .get_mut(key)
            .ok_or(Error::Internal("descriptor index out of sync"))?;

        let was_hot = registration.is_hot();
        arm(inner.reactor.as_mut(), registration, interest)?;
        match (was_hot, registration.is_hot()) {
            (false, true) => inner.hot += 1,
            (true, false) => inner.hot -= 1,
            _ => {}
        }

        tracing::trace!(fd = ?fd, interest = ?interest, "interest updated");

        Ok(())
    }

    /// Replaces both the interest and the handler of a registered descriptor.
    pub fn modify_with<F>(&self, fd: RawFd, interest: Interest, handler: F) -> Result<()>
    where
        F: FnMut(RawFd, Interest) + 'static,
    {
        self.modify(fd, interest)?;

        let old = {
            let mut inner = self.inner.borrow_mut();
            let key = *inner
                .index
                .get(&fd)
                .ok_or(Error::Internal("descriptor index out of sync"))?;
            let registration = inner
                .registry
                .get_mut(key)
                .ok_or(Error::Internal("descriptor index out of sync"))?;

            let handler: Handler = Rc::new(RefCell::new(handler));
            mem::replace(&mut registration.handler, handler)
        };
        drop(old);

        Ok(())
    }

    /// Deregisters `fd`. Unknown descriptors are ignored.
    ///
    /// The registration's slot is invalidated immediately: a readiness
    /// event for `fd` already collected by an in-progress
    /// [`wait`](Self::wait) is skipped.
    pub fn remove(&self, fd: RawFd) {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let Some(key) = inner.index.remove(&fd) else {
                return;
            };
            let Some(registration) = inner.registry.remove(key) else {
                return;
            };

            if registration.is_hot() {
                inner.hot -= 1;
            }

            if registration.armed {
                if let Err(err) = inner.reactor.remove(fd) {
                    tracing::debug!(fd = ?fd, error = %err, "os deregistration failed");
                }
            }

            registration
        };

        tracing::debug!(fd = ?fd, "deregistered");
        drop(removed);
    }

    /// Waits for readiness and runs the handler of every ready descriptor.
    ///
    /// Blocks for at most `timeout_ms` milliseconds (`-1` blocks
    /// indefinitely). An always-ready descriptor with a non-empty interest
    /// turns the wait into a non-blocking poll. Returns the number of handlers that ran.
    ///
    /// Readiness is coalesced per descriptor, so each ready descriptor's
    /// handler runs exactly once per call.
    pub fn wait(&self, timeout_ms: i32) -> Result<usize> {
        let batch = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;

            let mut events = mem::take(&mut inner.events);
            events.clear();

            let timeout = if inner.hot > 0 { 0 } else { timeout_ms };
            if let Err(err) = inner.reactor.poll(&mut events, timeout) {
                inner.events = events;
                return Err(Error::Io(err));
            }

            if inner.hot > 0 {
                for (_, registration) in inner.registry.iter() {
                    if registration.is_hot() {
                        events.push(Event::new(registration.fd, registration.interest));
                    }
                }
            }

            let mut batch: Vec<(Key, Interest)> = Vec::with_capacity(events.len());
            let mut positions: HashMap<Key, usize> = HashMap::with_capacity(events.len());

            for event in events.drain(..) {
                let Some(&key) = inner.index.get(&event.fd) else {
                    continue;
                };

                match positions.get(&key) {
                    Some(&pos) => batch[pos].1 |= event.ready,
                    None => {
                        positions.insert(key, batch.len());
                        batch.push((key, event.ready));
                    }
                }
            }

            inner.events = events;
            batch
        };

        let mut dispatched = 0;

        for (key, ready) in batch {
            let target = {
                let inner = self.inner.borrow();
                inner.registry.get(key).map(|registration| {
                    (
                        registration.fd,
                        ready & (registration.interest | Interest::ERROR),
                        registration.handler.clone(),
                    )
                })
            };

            let Some((fd, ready, handler)) = target else {
                tracing::trace!(slot = key.index(), "skipping stale registration");
                continue;
            };

            if ready.is_empty() {
                continue;
            }

            let Ok(mut callback) = handler.try_borrow_mut() else {
                continue;
            };

            tracing::trace!(fd = ?fd, ready = ?ready, "dispatch");
            (&mut *callback)(fd, ready);
            dispatched += 1;
        }

        Ok(dispatched)
    }

    /// Whether `fd` is registered.
    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.inner.borrow().index.contains_key(&fd)
    }

    /// Interest currently requested for `fd`.
    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        let inner = self.inner.borrow();
        let key = *inner.index.get(&fd)?;
        inner.registry.get(key).map(|registration| registration.interest)
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.inner.borrow().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of registration slots. Grows on demand and never shrinks.
    pub fn capacity(&self) -> usize {
        self.inner.borrow().registry.capacity()
    }

    /// Name of the OS facility in use.
    pub fn backend(&self) -> &'static str {
        self.inner.borrow().reactor.name()
    }
}

/// Brings the OS facility in line with `interest` for one registration.
fn arm(reactor: &mut dyn Reactor, registration: &mut Registration, interest: Interest) -> Result<()> {
    let fd = registration.fd;

    if registration.always_ready {
        registration.interest = interest;
        return Ok(());
    }

    if interest.is_empty() {
        if registration.armed {
            reactor.remove(fd).map_err(Error::Io)?;
            registration.armed = false;
        }
    } else if registration.armed {
        reactor.modify(fd, interest).map_err(Error::Io)?;
    } else {
        match reactor.add(fd, interest) {
            Ok(()) => registration.armed = true,
            Err(err) if platform::is_unpollable(&err) => {
                tracing::debug!(fd = ?fd, "descriptor is always ready");
                registration.always_ready = true;
            }
            Err(err) => return Err(Error::Io(err)),
        }
    }

    registration.interest = interest;
    Ok(())
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Poller")
            .field("backend", &inner.reactor.name())
            .field("registered", &inner.registry.len())
            .field("capacity", &inner.registry.capacity())
            .finish()
    }
}
