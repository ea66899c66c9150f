use vigilis::time::Deadline;
use vigilis::{Error, ErrorKind, EventLoop, Interest, Stream, StreamKind, Timer};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn quick_loop() -> EventLoop {
    EventLoop::builder()
        .poll_timeout_ms(5)
        .build()
        .expect("Failed to build event loop")
}

/// Ticks until `done` holds, for at most five seconds.
fn tick_until(event_loop: &EventLoop, done: impl Fn() -> bool) -> bool {
    let deadline = Deadline::from_now(5_000);
    while !done() {
        if deadline.expired() {
            return false;
        }
        event_loop.tick().expect("tick");
    }
    true
}

/// A listener on an ephemeral loopback port that keeps every accepted
/// stream alive in `accepted`.
fn listen(event_loop: &EventLoop) -> (Stream, u16, Rc<RefCell<Vec<Stream>>>) {
    let listener = Stream::open_tcp(event_loop).expect("Failed to open listener");
    listener.bind(Some("127.0.0.1"), 0).expect("Failed to bind");
    listener.listen(16).expect("Failed to listen");

    let port = listener.local_addr().expect("local address").port();
    let accepted = Rc::new(RefCell::new(Vec::new()));

    let sink = accepted.clone();
    listener
        .on_connection(move |listener| {
            while let Ok(peer) = listener.accept() {
                sink.borrow_mut().push(peer);
            }
        })
        .expect("Failed to set connection callback");

    (listener, port, accepted)
}

fn collector(stream: &Stream) -> Rc<RefCell<Vec<u8>>> {
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    stream
        .read_start(move |_, chunk| {
            if let Ok(bytes) = chunk {
                sink.borrow_mut().extend_from_slice(bytes);
            }
        })
        .expect("Failed to start reading");
    received
}

#[test]
fn test_tcp_ping_pong() {
    let event_loop = quick_loop();
    let calls = Rc::new(Cell::new(0));
    let accepted: Rc<RefCell<Vec<Stream>>> = Rc::default();

    let listener = Stream::open_tcp(&event_loop).expect("Failed to open listener");
    listener.bind(Some("127.0.0.1"), 0).expect("Failed to bind");
    listener.listen(16).expect("Failed to listen");
    let port = listener.local_addr().expect("local address").port();

    let (sink, counter) = (accepted.clone(), calls.clone());
    listener
        .on_connection(move |listener| {
            counter.set(counter.get() + 1);
            while let Ok(peer) = listener.accept() {
                assert_eq!(peer.kind(), StreamKind::Tcp);

                let counter = counter.clone();
                peer.read_start(move |stream, chunk| {
                    counter.set(counter.get() + 1);
                    if let Ok(b"ping") = chunk {
                        let counter = counter.clone();
                        stream
                            .write_with(b"pong", move |_, _| counter.set(counter.get() + 1))
                            .expect("Failed to queue pong");
                    }
                })
                .expect("Failed to start reading");
                sink.borrow_mut().push(peer);
            }
        })
        .expect("Failed to set connection callback");

    let client = Stream::open_tcp(&event_loop).expect("Failed to open client");
    client.connect("127.0.0.1", port).expect("Failed to connect");

    let received = Rc::new(RefCell::new(Vec::new()));
    let (sink, counter) = (received.clone(), calls.clone());
    client
        .read_start(move |stream, chunk| {
            counter.set(counter.get() + 1);
            if let Ok(bytes) = chunk {
                sink.borrow_mut().extend_from_slice(bytes);
                if sink.borrow().as_slice() == b"pong" {
                    stream.event_loop().stop();
                }
            }
        })
        .expect("Failed to start reading");

    let counter = calls.clone();
    client
        .write_with(b"ping", move |_, result| {
            assert!(result.is_ok());
            counter.set(counter.get() + 1);
        })
        .expect("Failed to queue ping");

    let stopper = event_loop.clone();
    let guard = Timer::start(&event_loop, 5_000, 0, move |_| stopper.stop());
    event_loop.run().expect("Failed to run loop");
    guard.stop();

    assert_eq!(received.borrow().as_slice(), b"pong");
    assert_eq!(client.outbuf_len(), 0);

    client.close().expect("Failed to close client");
    for peer in accepted.borrow().iter() {
        peer.close().expect("Failed to close server side");
    }
    listener.close().expect("Failed to close listener");

    let settled = calls.get();
    for _ in 0..10 {
        event_loop.tick().expect("tick");
    }
    assert_eq!(calls.get(), settled, "no callback may run after close");
    assert!(event_loop.poller().is_empty());
}

#[test]
fn test_tcp_end_of_stream_is_reported_once() {
    let event_loop = quick_loop();
    let (_listener, port, accepted) = listen(&event_loop);

    let client = Stream::open_tcp(&event_loop).expect("Failed to open client");
    client.connect("127.0.0.1", port).expect("Failed to connect");

    let closed = Rc::new(Cell::new(0));
    let counter = closed.clone();
    client
        .read_start(move |_, chunk| {
            if let Err(Error::Closed) = chunk {
                counter.set(counter.get() + 1);
            }
        })
        .expect("Failed to start reading");

    assert!(tick_until(&event_loop, || !accepted.borrow().is_empty()));
    let server_side = accepted.borrow_mut().remove(0);
    server_side.close().expect("Failed to close server side");

    assert!(tick_until(&event_loop, || client.is_eof()));
    for _ in 0..5 {
        event_loop.tick().expect("tick");
    }
    assert_eq!(closed.get(), 1);
}

#[test]
fn test_writable_callback_fires_once() {
    let event_loop = quick_loop();
    let (_listener, port, accepted) = listen(&event_loop);

    let client = Stream::open_tcp(&event_loop).expect("Failed to open client");
    client.connect("127.0.0.1", port).expect("Failed to connect");

    let drained = Rc::new(Cell::new(0));
    let counter = drained.clone();
    client
        .write_with(b"hello", move |stream, result| {
            assert!(result.is_ok());
            assert_eq!(stream.outbuf_len(), 0);
            counter.set(counter.get() + 1);
        })
        .expect("Failed to queue write");

    assert!(tick_until(&event_loop, || drained.get() == 1));
    for _ in 0..5 {
        event_loop.tick().expect("tick");
    }
    assert_eq!(drained.get(), 1);
    assert!(tick_until(&event_loop, || !accepted.borrow().is_empty()));
}

#[test]
fn test_writev_keeps_chunk_order() {
    let event_loop = quick_loop();
    let (_listener, port, accepted) = listen(&event_loop);

    let client = Stream::open_tcp(&event_loop).expect("Failed to open client");
    client.connect("127.0.0.1", port).expect("Failed to connect");
    client
        .writev(&[b"one ", b"two ", b"three"])
        .expect("Failed to queue writev");
    assert_eq!(client.outbuf_len(), 13);

    assert!(tick_until(&event_loop, || !accepted.borrow().is_empty()));
    let server_side = accepted.borrow()[0].clone();
    let received = collector(&server_side);

    assert!(tick_until(&event_loop, || received.borrow().len() == 13));
    assert_eq!(received.borrow().as_slice(), b"one two three");
}

#[test]
fn test_pause_holds_back_reads() {
    let event_loop = quick_loop();
    let (_listener, port, accepted) = listen(&event_loop);

    let client = Stream::open_tcp(&event_loop).expect("Failed to open client");
    client.connect("127.0.0.1", port).expect("Failed to connect");
    let received = collector(&client);

    client.pause().expect("Failed to pause");
    assert_eq!(client.interest(), Interest::WRITE);

    assert!(tick_until(&event_loop, || !accepted.borrow().is_empty()));
    let server_side = accepted.borrow()[0].clone();
    server_side.write(b"data").expect("Failed to queue data");

    assert!(tick_until(&event_loop, || server_side.outbuf_len() == 0));
    for _ in 0..10 {
        event_loop.tick().expect("tick");
    }
    assert!(received.borrow().is_empty());

    client.resume().expect("Failed to resume");
    assert_eq!(client.interest(), Interest::READ | Interest::WRITE);
    assert!(tick_until(&event_loop, || received.borrow().as_slice() == b"data"));
}

#[test]
fn test_close_twice_fails() {
    let event_loop = quick_loop();
    let stream = Stream::open_tcp(&event_loop).expect("Failed to open stream");
    let fd = stream.fd().expect("open stream has a descriptor");
    assert!(event_loop.poller().is_registered(fd));

    stream.close().expect("first close");

    assert!(stream.is_closed());
    assert!(!event_loop.poller().is_registered(fd));
    assert!(matches!(stream.close(), Err(Error::InvalidState(_))));
    assert!(matches!(stream.write(b"late"), Err(Error::InvalidState(_))));
}

#[test]
fn test_dropping_last_handle_deregisters() {
    let event_loop = quick_loop();
    let stream = Stream::open_tcp(&event_loop).expect("Failed to open stream");
    let fd = stream.fd().expect("open stream has a descriptor");

    drop(stream);

    assert!(!event_loop.poller().is_registered(fd));
}

#[test]
fn test_accept_without_pending_connection_would_block() {
    let event_loop = quick_loop();
    let listener = Stream::open_tcp(&event_loop).expect("Failed to open listener");
    listener.bind(Some("127.0.0.1"), 0).expect("Failed to bind");

    assert!(matches!(listener.accept(), Err(Error::InvalidState(_))));

    listener.listen(4).expect("Failed to listen");
    assert!(matches!(listener.accept(), Err(Error::WouldBlock)));
}

#[test]
fn test_udp_cannot_listen() {
    let event_loop = quick_loop();
    let socket = Stream::open_udp(&event_loop).expect("Failed to open UDP socket");
    socket.bind(Some("127.0.0.1"), 0).expect("Failed to bind");

    assert_eq!(socket.kind(), StreamKind::Udp);
    assert!(matches!(socket.listen(1), Err(Error::NotSupported(_))));
}

#[test]
fn test_udp_datagram_round_trip() {
    let event_loop = quick_loop();

    let receiver = Stream::open_udp(&event_loop).expect("Failed to open receiver");
    receiver.bind(Some("127.0.0.1"), 0).expect("Failed to bind receiver");
    let port = receiver.local_addr().expect("local address").port();
    let received = collector(&receiver);

    let sender = Stream::open_udp(&event_loop).expect("Failed to open sender");
    sender.connect("127.0.0.1", port).expect("Failed to connect sender");
    sender.write(b"datagram").expect("Failed to queue datagram");

    assert!(tick_until(&event_loop, || received.borrow().as_slice() == b"datagram"));
}

#[test]
fn test_refused_connection_is_reported() {
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind probe");
        probe.local_addr().expect("probe address").port()
    };

    let event_loop = quick_loop();
    let client = Stream::open_tcp(&event_loop).expect("Failed to open client");

    if let Err(err) = client.connect("127.0.0.1", port) {
        assert!(matches!(err, Error::Io(_)));
        return;
    }

    let failure = Rc::new(RefCell::new(None));
    let slot = failure.clone();
    client
        .write_with(b"never sent", move |_, result| {
            *slot.borrow_mut() = result.err().map(|err| err.kind());
        })
        .expect("Failed to queue write");

    assert!(tick_until(&event_loop, || failure.borrow().is_some()));
    assert!(matches!(client.write(b"again"), Err(Error::Closed)));
}

#[test]
fn test_pending_connect_times_out() {
    let event_loop = EventLoop::builder()
        .poll_timeout_ms(5)
        .default_timeout_ms(1)
        .build()
        .expect("Failed to build event loop");
    let (_listener, port, _accepted) = listen(&event_loop);
    assert_eq!(event_loop.options().default_timeout_ms, 1);

    let client = Stream::open_tcp(&event_loop).expect("Failed to open client");
    client.connect("127.0.0.1", port).expect("Failed to connect");
    if event_loop.active_timers() == 0 {
        // Loopback connect finished synchronously, nothing to time out.
        return;
    }

    let failure = Rc::new(RefCell::new(None));
    let slot = failure.clone();
    client
        .write_with(b"late", move |_, result| {
            *slot.borrow_mut() = result.err().map(|err| err.kind());
        })
        .expect("Failed to queue write");

    std::thread::sleep(std::time::Duration::from_millis(5));
    event_loop.tick().expect("tick");

    assert_eq!(*failure.borrow(), Some(ErrorKind::Timeout));
    assert!(matches!(client.write(b"again"), Err(Error::Closed)));
    assert_eq!(event_loop.active_timers(), 0);
}

#[test]
fn test_connect_timer_is_cancelled_on_connect() {
    let event_loop = EventLoop::builder()
        .poll_timeout_ms(5)
        .default_timeout_ms(60_000)
        .build()
        .expect("Failed to build event loop");
    let (_listener, port, accepted) = listen(&event_loop);

    let client = Stream::open_tcp(&event_loop).expect("Failed to open client");
    client.connect("127.0.0.1", port).expect("Failed to connect");
    let drained = Rc::new(Cell::new(false));
    let flag = drained.clone();
    client
        .write_with(b"hi", move |_, result| flag.set(result.is_ok()))
        .expect("Failed to queue write");

    assert!(tick_until(&event_loop, || drained.get() && !accepted.borrow().is_empty()));
    assert_eq!(event_loop.active_timers(), 0);
}
