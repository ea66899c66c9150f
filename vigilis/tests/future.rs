use vigilis::{CancelToken, Error, ErrorKind, EventLoop, Future, FutureState};

use std::cell::RefCell;
use std::rc::Rc;

fn quick_loop() -> EventLoop {
    EventLoop::builder()
        .poll_timeout_ms(0)
        .build()
        .expect("Failed to build event loop")
}

#[test]
fn test_continuations_run_in_registration_order() {
    let event_loop = quick_loop();
    let future: Future<u32> = Future::new(&event_loop);
    let seen = Rc::new(RefCell::new(Vec::new()));

    for tag in ["first", "second"] {
        let seen = seen.clone();
        future.then(move |f| seen.borrow_mut().push((tag, f.value().ok())));
    }

    future.resolve(7).expect("resolve pending future");

    assert_eq!(
        *seen.borrow(),
        vec![("first", Some(7)), ("second", Some(7))]
    );
    assert_eq!(future.state(), FutureState::Resolved);
}

#[test]
fn test_then_after_settlement_runs_on_next_tick() {
    let event_loop = quick_loop();
    let future = Future::new(&event_loop);
    future.resolve(String::from("done")).expect("resolve");

    let seen = Rc::new(RefCell::new(None));
    let slot = seen.clone();
    future.then(move |f| *slot.borrow_mut() = f.with_value(|s| s.len()).ok());

    assert!(seen.borrow().is_none());
    assert_eq!(event_loop.pending_tasks(), 1);

    event_loop.tick().expect("tick");
    assert_eq!(*seen.borrow(), Some(4));
}

#[test]
fn test_settling_twice_fails() {
    let event_loop = quick_loop();
    let future = Future::new(&event_loop);

    future.reject(ErrorKind::Timeout).expect("reject");

    assert!(matches!(future.resolve(1), Err(Error::InvalidState(_))));
    assert!(matches!(
        future.cancel(ErrorKind::Canceled),
        Err(Error::InvalidState(_))
    ));
    assert_eq!(future.error().expect("rejected"), ErrorKind::Timeout);
    assert!(matches!(future.value(), Err(Error::InvalidState(_))));
}

#[test]
fn test_pending_future_has_no_error() {
    let event_loop = quick_loop();
    let future: Future<()> = Future::new(&event_loop);

    assert!(future.is_pending());
    assert!(matches!(future.error(), Err(Error::InvalidState(_))));
}

#[test]
fn test_cancel_token_cancels_future() {
    let event_loop = quick_loop();
    let future: Future<u8> = Future::new(&event_loop);
    let token = CancelToken::new();

    let target = future.clone();
    token.register(move |reason| {
        let _ = target.cancel(reason);
    });

    assert!(token.trigger(ErrorKind::Canceled));
    assert!(!token.trigger(ErrorKind::Timeout));

    assert_eq!(future.state(), FutureState::Canceled);
    assert_eq!(future.error().expect("canceled"), ErrorKind::Canceled);
    assert_eq!(token.reason(), Some(ErrorKind::Canceled));
}
