//! Windows `WSAPoll` backend.
//!
//! Readiness-based: it mirrors the semantics of `poll(2)` over
//! non-blocking WinSock sockets and is what the `Iocp` backend hint
//! selects. `WSAPoll` rejects an empty descriptor set, so a poll with
//! nothing registered simply sleeps for the timeout.

use super::Reactor;
use super::platform::{RawFd, ensure_winsock};
use crate::reactor::event::Event;
use crate::reactor::interest::Interest;

use std::collections::HashMap;
use std::io;
use std::thread;
use std::time::Duration;

use windows_sys::Win32::Networking::WinSock::{
    POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, SOCKET, SOCKET_ERROR, WSAPOLLFD, WSAPoll,
};

/// `WSAPoll` reactor.
pub(crate) struct WsaPoll {
    /// Registered sockets and their interest.
    reg: HashMap<RawFd, Interest>,

    /// Reusable poll set.
    fds: Vec<WSAPOLLFD>,
}

impl WsaPoll {
    pub(crate) fn new() -> io::Result<Self> {
        ensure_winsock()?;

        Ok(Self {
            reg: HashMap::new(),
            fds: Vec::new(),
        })
    }
}

impl Reactor for WsaPoll {
    fn name(&self) -> &'static str {
        "wsapoll"
    }

    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.reg.insert(fd, interest);
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.reg.insert(fd, interest);
        Ok(())
    }

    fn remove(&mut self, fd: RawFd) -> io::Result<()> {
        self.reg.remove(&fd);
        Ok(())
    }

    fn poll(&mut self, events: &mut Vec<Event>, timeout_ms: i32) -> io::Result<()> {
        if self.reg.is_empty() {
            if timeout_ms > 0 {
                thread::sleep(Duration::from_millis(timeout_ms as u64));
            }
            return Ok(());
        }

        self.fds.clear();
        for (&fd, &interest) in self.reg.iter() {
            let mut ev = 0;
            if interest.is_readable() {
                ev |= POLLIN;
            }
            if interest.is_writable() {
                ev |= POLLOUT;
            }

            self.fds.push(WSAPOLLFD {
                fd: fd as SOCKET,
                events: ev,
                revents: 0,
            });
        }

        let rc = unsafe { WSAPoll(self.fds.as_mut_ptr(), self.fds.len() as u32, timeout_ms) };
        if rc == SOCKET_ERROR {
            return Err(io::Error::last_os_error());
        }

        for pfd in &self.fds {
            let re = pfd.revents as i32;
            if re == 0 {
                continue;
            }

            let mut ready = Interest::NONE;
            if re & (POLLIN | POLLHUP) as i32 != 0 {
                ready |= Interest::READ;
            }
            if re & POLLOUT as i32 != 0 {
                ready |= Interest::WRITE;
            }
            if re & (POLLERR | POLLNVAL) as i32 != 0 {
                ready |= Interest::ERROR;
            }

            events.push(Event::new(pfd.fd as RawFd, ready));
        }

        Ok(())
    }
}
