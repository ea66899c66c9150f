use vigilis::{BackendHint, Error, Event, Interest, Poller, RawFd, Reactor};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

/// Reactor fed by the test instead of the OS.
struct Manual {
    pending: Rc<RefCell<VecDeque<Event>>>,
}

impl Reactor for Manual {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn add(&mut self, _fd: RawFd, _interest: Interest) -> io::Result<()> {
        Ok(())
    }

    fn modify(&mut self, _fd: RawFd, _interest: Interest) -> io::Result<()> {
        Ok(())
    }

    fn remove(&mut self, _fd: RawFd) -> io::Result<()> {
        Ok(())
    }

    fn poll(&mut self, events: &mut Vec<Event>, _timeout_ms: i32) -> io::Result<()> {
        events.extend(self.pending.borrow_mut().drain(..));
        Ok(())
    }
}

fn manual_poller() -> (Poller, Rc<RefCell<VecDeque<Event>>>) {
    let pending = Rc::new(RefCell::new(VecDeque::new()));
    let poller = Poller::with_reactor(
        Box::new(Manual {
            pending: pending.clone(),
        }),
        64,
    );
    (poller, pending)
}

#[test]
fn test_events_for_one_fd_are_coalesced() {
    let (poller, pending) = manual_poller();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let log = seen.clone();
    poller
        .add(5, Interest::READ | Interest::WRITE, move |fd, ready| {
            log.borrow_mut().push((fd, ready))
        })
        .expect("register");

    pending.borrow_mut().push_back(Event::new(5, Interest::READ));
    pending.borrow_mut().push_back(Event::new(5, Interest::WRITE));

    assert_eq!(poller.wait(0).expect("wait"), 1);
    assert_eq!(*seen.borrow(), vec![(5, Interest::READ | Interest::WRITE)]);
}

#[test]
fn test_readiness_outside_interest_is_masked() {
    let (poller, pending) = manual_poller();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let log = seen.clone();
    poller
        .add(6, Interest::READ, move |_, ready| log.borrow_mut().push(ready))
        .expect("register");

    pending.borrow_mut().push_back(Event::new(6, Interest::WRITE));
    assert_eq!(poller.wait(0).expect("wait"), 0);

    pending
        .borrow_mut()
        .push_back(Event::new(6, Interest::WRITE | Interest::ERROR));
    assert_eq!(poller.wait(0).expect("wait"), 1);
    assert_eq!(*seen.borrow(), vec![Interest::ERROR]);
}

#[test]
fn test_handler_may_remove_another_registration() {
    let (poller, pending) = manual_poller();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let handle = poller.clone();
    let log = seen.clone();
    poller
        .add(7, Interest::READ, move |fd, _| {
            log.borrow_mut().push(fd);
            handle.remove(8);
        })
        .expect("register 7");

    let log = seen.clone();
    poller
        .add(8, Interest::READ, move |fd, _| log.borrow_mut().push(fd))
        .expect("register 8");

    pending.borrow_mut().push_back(Event::new(7, Interest::READ));
    pending.borrow_mut().push_back(Event::new(8, Interest::READ));

    assert_eq!(poller.wait(0).expect("wait"), 1);
    assert_eq!(*seen.borrow(), vec![7]);
    assert!(!poller.is_registered(8));
}

#[test]
fn test_duplicate_and_unknown_descriptors() {
    let (poller, _) = manual_poller();

    poller.add(9, Interest::READ, |_, _| {}).expect("register");

    assert!(matches!(
        poller.add(9, Interest::WRITE, |_, _| {}),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        poller.modify(10, Interest::READ),
        Err(Error::InvalidState(_))
    ));
    #[cfg(unix)]
    assert!(matches!(
        poller.add(-1, Interest::READ, |_, _| {}),
        Err(Error::InvalidArgument(_))
    ));

    poller.remove(10);
    poller.remove(9);
    poller.remove(9);
    assert!(poller.is_empty());
}

#[test]
fn test_modify_with_swaps_handler() {
    let (poller, pending) = manual_poller();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let log = seen.clone();
    poller
        .add(11, Interest::READ, move |_, _| log.borrow_mut().push("old"))
        .expect("register");

    let log = seen.clone();
    poller
        .modify_with(11, Interest::WRITE, move |_, _| log.borrow_mut().push("new"))
        .expect("swap handler");

    pending.borrow_mut().push_back(Event::new(11, Interest::WRITE));
    poller.wait(0).expect("wait");

    assert_eq!(*seen.borrow(), vec!["new"]);
    assert_eq!(poller.interest(11), Some(Interest::WRITE));
}

#[test]
fn test_slots_grow_on_demand() {
    let (poller, _) = manual_poller();
    let initial = poller.capacity();

    for fd in 0..(initial as RawFd + 4) {
        poller.add(fd, Interest::READ, |_, _| {}).expect("register");
    }

    assert_eq!(poller.len(), initial + 4);
    assert!(poller.capacity() > initial);
}

#[test]
fn test_unknown_backend_code_is_rejected() {
    assert_eq!(BackendHint::from_code(4).expect("poll"), BackendHint::Poll);
    assert!(matches!(BackendHint::from_code(9), Err(Error::Config(_))));
    assert!(matches!(Poller::new(BackendHint::Auto, 0), Err(Error::InvalidArgument(_))));
}

#[cfg(unix)]
mod os {
    use super::*;

    fn raw_pipe() -> (RawFd, RawFd) {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0, "pipe failed");
        (fds[0], fds[1])
    }

    fn close(fd: RawFd) {
        unsafe { libc::close(fd) };
    }

    fn check_pipe_readiness(poller: Poller) {
        let (reader, writer) = raw_pipe();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = seen.clone();
        poller
            .add(reader, Interest::READ, move |fd, ready| {
                log.borrow_mut().push((fd, ready))
            })
            .expect("register reader");

        assert_eq!(poller.wait(0).expect("idle wait"), 0);

        let n = unsafe { libc::write(writer, b"x".as_ptr().cast(), 1) };
        assert_eq!(n, 1);

        assert_eq!(poller.wait(1_000).expect("wait"), 1);
        assert_eq!(*seen.borrow(), vec![(reader, Interest::READ)]);

        poller.modify(reader, Interest::NONE).expect("withdraw");
        assert_eq!(poller.wait(0).expect("withdrawn wait"), 0);

        poller.remove(reader);
        assert_eq!(poller.wait(0).expect("empty wait"), 0);

        close(reader);
        close(writer);
    }

    #[test]
    fn test_default_backend_reports_pipe_readiness() {
        let poller = Poller::new(BackendHint::Auto, 16).expect("open default backend");
        check_pipe_readiness(poller);
    }

    #[test]
    fn test_poll_backend_reports_pipe_readiness() {
        let poller = Poller::new(BackendHint::Poll, 16).expect("open poll backend");
        check_pipe_readiness(poller);
    }

    #[test]
    fn test_hangup_reads_as_readable() {
        let poller = Poller::new(BackendHint::Auto, 16).expect("open default backend");
        let (reader, writer) = raw_pipe();
        let seen = Rc::new(RefCell::new(Interest::NONE));

        let slot = seen.clone();
        poller
            .add(reader, Interest::READ, move |_, ready| *slot.borrow_mut() = ready)
            .expect("register reader");

        close(writer);

        assert_eq!(poller.wait(1_000).expect("wait"), 1);
        assert!(seen.borrow().is_readable());

        poller.remove(reader);
        close(reader);
    }
}
