use vigilis::time::{Deadline, monotonic_ms};
use vigilis::{EventLoop, Timer};

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

fn quick_loop() -> EventLoop {
    EventLoop::builder()
        .poll_timeout_ms(1)
        .build()
        .expect("Failed to build event loop")
}

/// Ticks until `done` holds, for at most two seconds.
fn tick_until(event_loop: &EventLoop, done: impl Fn() -> bool) -> bool {
    let deadline = Deadline::from_now(2_000);
    while !done() {
        if deadline.expired() {
            return false;
        }
        event_loop.tick().expect("tick");
    }
    true
}

#[test]
fn test_one_shot_fires_once() {
    let event_loop = quick_loop();
    let fired = Rc::new(Cell::new(0));

    let counter = fired.clone();
    let timer = Timer::start(&event_loop, 0, 0, move |_| counter.set(counter.get() + 1));

    event_loop.tick().expect("tick");
    event_loop.tick().expect("tick");

    assert_eq!(fired.get(), 1);
    assert!(!timer.is_active());
    assert_eq!(event_loop.active_timers(), 0);
}

#[test]
fn test_one_shot_waits_for_its_delay() {
    let event_loop = quick_loop();
    let fired_at = Rc::new(Cell::new(0u64));

    let start = monotonic_ms();
    let slot = fired_at.clone();
    Timer::start(&event_loop, 30, 0, move |_| slot.set(monotonic_ms()));

    assert!(tick_until(&event_loop, || fired_at.get() != 0));
    assert!(
        fired_at.get() - start >= 30,
        "Timer should not fire before its delay"
    );
}

#[test]
fn test_periodic_stops_itself() {
    let event_loop = quick_loop();
    let fired = Rc::new(Cell::new(0));

    let counter = fired.clone();
    let timer = Timer::start(&event_loop, 0, 5, move |timer| {
        counter.set(counter.get() + 1);
        if counter.get() == 3 {
            timer.stop();
        }
    });

    assert!(tick_until(&event_loop, || !timer.is_active()));
    assert_eq!(fired.get(), 3);

    std::thread::sleep(Duration::from_millis(10));
    event_loop.tick().expect("tick");
    assert_eq!(fired.get(), 3);
}

#[test]
fn test_periodic_reschedules_by_period() {
    let event_loop = quick_loop();
    let timer = Timer::start(&event_loop, 0, 50, |_| {});
    let first = timer.deadline_ms();

    event_loop.tick().expect("tick");

    assert!(timer.is_active());
    assert!(timer.deadline_ms() >= first + 50);
    assert_eq!(timer.period_ms(), 50);
}

#[test]
fn test_slow_periodic_callback_fires_once_per_tick() {
    let event_loop = quick_loop();
    let fired = Rc::new(Cell::new(0));

    let counter = fired.clone();
    let timer = Timer::start(&event_loop, 0, 10, move |_| {
        counter.set(counter.get() + 1);
        std::thread::sleep(Duration::from_millis(30));
    });

    let mut deadlines = Vec::new();
    for _ in 0..3 {
        let before_fires = fired.get();
        let tick_start = monotonic_ms();
        event_loop.tick().expect("tick");
        let tick_end = monotonic_ms();

        assert_eq!(fired.get(), before_fires + 1, "one fire per tick");

        let deadline = timer.deadline_ms();
        assert!(deadline >= tick_start + 10);
        assert!(deadline + 30 <= tick_end + 10, "rescheduled from the tick start");
        deadlines.push(deadline);
    }

    for pair in deadlines.windows(2) {
        assert!(
            pair[1] - pair[0] >= 30,
            "deadline should follow the clock, not accumulate periods"
        );
    }

    timer.stop();
}

#[test]
fn test_stopped_timer_never_fires() {
    let event_loop = quick_loop();
    let fired = Rc::new(Cell::new(false));

    let flag = fired.clone();
    let timer = Timer::start(&event_loop, 0, 0, move |_| flag.set(true));
    timer.stop();
    timer.stop();

    event_loop.tick().expect("tick");
    assert!(!fired.get());
    assert_eq!(event_loop.active_timers(), 0);
}

#[test]
fn test_destroy_deactivates_timers() {
    let event_loop = quick_loop();
    let timer = Timer::start(&event_loop, 1_000, 0, |_| {});
    assert_eq!(event_loop.active_timers(), 1);

    event_loop.destroy();

    assert!(!timer.is_active());
    assert_eq!(event_loop.active_timers(), 0);
}

#[test]
fn test_deadline_remaining_counts_down() {
    let deadline = Deadline::at(1_000);

    assert_eq!(deadline.remaining_at(400), 600);
    assert_eq!(deadline.remaining_at(1_500), 0);
    assert!(Deadline::from_now(0).expired());
}
