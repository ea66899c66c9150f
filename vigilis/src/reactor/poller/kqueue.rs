//! BSD / macOS `kqueue` backend.
//!
//! kqueue has one filter per direction, so the backend remembers the
//! interest last installed for each descriptor and only adds or deletes
//! the filters that changed.

use super::Reactor;
use super::platform::RawFd;
use crate::reactor::event::Event;
use crate::reactor::interest::Interest;

use libc::{
    EV_ADD, EV_DELETE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_WRITE, kevent, kqueue, timespec,
};
use std::collections::HashMap;
use std::{io, mem, ptr};

/// kqueue reactor.
pub(crate) struct Kqueue {
    kq: RawFd,

    /// Interest currently installed per descriptor.
    installed: HashMap<RawFd, Interest>,

    /// Reusable buffer for kernel events.
    events: Vec<kevent>,
}

fn change(fd: RawFd, filter: i16, flags: u16) -> kevent {
    let mut ev: kevent = unsafe { mem::zeroed() };
    ev.ident = fd as _;
    ev.filter = filter as _;
    ev.flags = flags as _;
    ev
}

impl Kqueue {
    pub(crate) fn new(max_events: usize) -> io::Result<Self> {
        let kq = unsafe { kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }

        unsafe {
            libc::fcntl(kq, libc::F_SETFD, libc::FD_CLOEXEC);
        }

        Ok(Self {
            kq,
            installed: HashMap::new(),
            events: Vec::with_capacity(max_events.max(1)),
        })
    }

    /// Submits the filter changes needed to go from `old` to `new`.
    fn apply(&self, fd: RawFd, old: Interest, new: Interest) -> io::Result<()> {
        let mut changes = Vec::with_capacity(2);

        for (flag, filter) in [(Interest::READ, EVFILT_READ), (Interest::WRITE, EVFILT_WRITE)] {
            match (old.contains(flag), new.contains(flag)) {
                (false, true) => changes.push(change(fd, filter as i16, EV_ADD as u16)),
                (true, false) => changes.push(change(fd, filter as i16, EV_DELETE as u16)),
                _ => {}
            }
        }

        if changes.is_empty() {
            return Ok(());
        }

        let rc = unsafe {
            kevent(
                self.kq,
                changes.as_ptr(),
                changes.len() as _,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };

        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Reactor for Kqueue {
    fn name(&self) -> &'static str {
        "kqueue"
    }

    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.apply(fd, Interest::NONE, interest)?;
        self.installed.insert(fd, interest);
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        let old = self.installed.get(&fd).copied().unwrap_or(Interest::NONE);
        self.apply(fd, old, interest)?;
        self.installed.insert(fd, interest);
        Ok(())
    }

    fn remove(&mut self, fd: RawFd) -> io::Result<()> {
        match self.installed.remove(&fd) {
            Some(old) => self.apply(fd, old, Interest::NONE),
            None => Ok(()),
        }
    }

    fn poll(&mut self, events: &mut Vec<Event>, timeout_ms: i32) -> io::Result<()> {
        let ts;
        let timeout = if timeout_ms < 0 {
            ptr::null()
        } else {
            ts = timespec {
                tv_sec: (timeout_ms / 1000) as _,
                tv_nsec: ((timeout_ms % 1000) * 1_000_000) as _,
            };
            &ts as *const timespec
        };

        let n = unsafe {
            kevent(
                self.kq,
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.capacity() as _,
                timeout,
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
            let fd = ev.ident as RawFd;
            let mut ready = Interest::NONE;

            if ev.filter == EVFILT_READ as _ {
                ready |= Interest::READ;
            }
            if ev.filter == EVFILT_WRITE as _ {
                ready |= Interest::WRITE;
            }
            if ev.flags & (EV_ERROR as _) != 0 {
                ready |= Interest::ERROR;
            }
            if ev.flags & (EV_EOF as _) != 0 {
                ready |= Interest::READ;
            }

            events.push(Event::new(fd, ready));
        }

        Ok(())
    }
}

impl Drop for Kqueue {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kq);
        }
    }
}
