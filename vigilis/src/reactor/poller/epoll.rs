//! Linux `epoll` backend.
//!
//! Registrations are level-triggered and keyed by descriptor: the
//! descriptor itself is stored in the event payload, so readiness can be
//! reported without a side table.

use super::Reactor;
use super::platform::RawFd;
use crate::reactor::event::Event;
use crate::reactor::interest::Interest;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;

/// Linux `epoll` reactor.
pub(crate) struct Epoll {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Reusable buffer for kernel events.
    events: Vec<epoll_event>,
}

impl Epoll {
    /// Creates an epoll instance able to report `max_events` per poll.
    pub(crate) fn new(max_events: usize) -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            epoll,
            events: Vec::with_capacity(max_events.max(1)),
        })
    }

    fn ctl(&self, op: i32, fd: RawFd, interest: Interest) -> io::Result<()> {
        let mut flags = EPOLLRDHUP;

        if interest.is_readable() {
            flags |= EPOLLIN;
        }
        if interest.is_writable() {
            flags |= EPOLLOUT;
        }

        let mut event = epoll_event {
            events: flags as u32,
            u64: fd as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Reactor for Epoll {
    fn name(&self) -> &'static str {
        "epoll"
    }

    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, interest)
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, interest)
    }

    fn remove(&mut self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn poll(&mut self, events: &mut Vec<Event>, timeout_ms: i32) -> io::Result<()> {
        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        for ev in &self.events {
            let bits = ev.events;
            let mut ready = Interest::NONE;

            if bits & ((EPOLLIN | EPOLLHUP | EPOLLRDHUP) as u32) != 0 {
                ready |= Interest::READ;
            }
            if bits & (EPOLLOUT as u32) != 0 {
                ready |= Interest::WRITE;
            }
            if bits & (EPOLLERR as u32) != 0 {
                ready |= Interest::ERROR;
            }

            events.push(Event::new(ev.u64 as RawFd, ready));
        }

        Ok(())
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll);
        }
    }
}
