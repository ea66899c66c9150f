use vigilis::{EventLoop, Timer, observe};

use std::sync::{Arc, Mutex};

#[test]
fn test_hooks_receive_timer_traces_and_tick_metrics() {
    let traces = Arc::new(Mutex::new(Vec::new()));
    let metrics = Arc::new(Mutex::new(Vec::new()));

    let sink = traces.clone();
    observe::set_trace_hook(move |phase, name, _duration, status| {
        sink.lock()
            .expect("trace sink")
            .push((phase.to_string(), name.to_string(), status.is_ok()));
    });

    let sink = metrics.clone();
    observe::set_metric_hook(move |key, value| {
        sink.lock().expect("metric sink").push((key.to_string(), value));
    });

    let event_loop = EventLoop::builder()
        .poll_timeout_ms(0)
        .build()
        .expect("Failed to build event loop");
    event_loop.post(|| {});
    Timer::start(&event_loop, 0, 0, |_| {});

    event_loop.tick().expect("tick");

    assert_eq!(
        *traces.lock().expect("trace sink"),
        vec![("timer".to_string(), "tick".to_string(), true)]
    );

    {
        let metrics = metrics.lock().expect("metric sink");
        assert!(metrics.contains(&("loop.tasks".to_string(), 1.0)));
        assert!(metrics.contains(&("loop.io_events".to_string(), 0.0)));
    }

    observe::clear_hooks();
    event_loop.post(|| {});
    event_loop.tick().expect("tick");

    assert_eq!(metrics.lock().expect("metric sink").len(), 2);
}
