//! Portable `poll(2)` backend.
//!
//! Available on every Unix target. The kernel keeps no registration
//! state, so the backend keeps its own descriptor table and rebuilds the
//! `pollfd` array on every call.

use super::Reactor;
use super::platform::RawFd;
use crate::reactor::event::Event;
use crate::reactor::interest::Interest;

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, nfds_t, pollfd};
use std::collections::HashMap;
use std::io;

/// `poll(2)` reactor.
pub(crate) struct Poll {
    registered: HashMap<RawFd, Interest>,
    fds: Vec<pollfd>,
}

impl Poll {
    pub(crate) fn new() -> Self {
        Self {
            registered: HashMap::new(),
            fds: Vec::new(),
        }
    }
}

impl Reactor for Poll {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.registered.insert(fd, interest);
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        match self.registered.get_mut(&fd) {
            Some(current) => {
                *current = interest;
                Ok(())
            }
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn remove(&mut self, fd: RawFd) -> io::Result<()> {
        self.registered.remove(&fd);
        Ok(())
    }

    fn poll(&mut self, events: &mut Vec<Event>, timeout_ms: i32) -> io::Result<()> {
        self.fds.clear();
        for (&fd, &interest) in &self.registered {
            let mut ev = 0;
            if interest.is_readable() {
                ev |= POLLIN;
            }
            if interest.is_writable() {
                ev |= POLLOUT;
            }

            self.fds.push(pollfd {
                fd,
                events: ev,
                revents: 0,
            });
        }

        let rc = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        for pfd in &self.fds {
            let re = pfd.revents;
            if re == 0 {
                continue;
            }

            let mut ready = Interest::NONE;
            if re & (POLLIN | POLLHUP) != 0 {
                ready |= Interest::READ;
            }
            if re & POLLOUT != 0 {
                ready |= Interest::WRITE;
            }
            if re & (POLLERR | POLLNVAL) != 0 {
                ready |= Interest::ERROR;
            }

            events.push(Event::new(pfd.fd, ready));
        }

        Ok(())
    }
}
