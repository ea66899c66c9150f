use super::clock::monotonic_ms;
use crate::observe;
use crate::runtime::EventLoop;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

struct TimerInner {
    /// Absolute monotonic deadline, in milliseconds.
    deadline: Cell<u64>,

    /// Zero for one-shot timers.
    period: u64,

    active: Cell<bool>,

    callback: RefCell<Box<dyn FnMut(&Timer)>>,
}

/// A one-shot or periodic callback driven by an [`EventLoop`].
///
/// Timers are checked once per [`tick`](EventLoop::tick), after posted
/// tasks and before I/O. A timer fires when the monotonic clock has
/// reached its deadline; a periodic timer is then rescheduled to
/// `now + period`, measured from the tick that fired it rather than from
/// its previous deadline, so a late tick never causes a burst of
/// catch-up fires.
///
/// The handle is cheap to clone. Dropping every handle does not cancel
/// the timer: the loop keeps it alive until it is stopped or, for
/// one-shot timers, has fired.
///
/// # Examples
///
/// ```rust,ignore
/// let event_loop = EventLoop::new()?;
/// let timer = Timer::start(&event_loop, 100, 0, |_| println!("fired"));
/// ```
#[derive(Clone)]
pub struct Timer {
    inner: Rc<TimerInner>,
}

impl Timer {
    /// Schedules `callback` to run `delay_ms` from now, then every
    /// `period_ms` if it is non-zero.
    pub fn start<F>(
        event_loop: &EventLoop,
        delay_ms: u64,
        period_ms: u64,
        callback: F,
    ) -> Timer
    where
        F: FnMut(&Timer) + 'static,
    {
        let timer = Timer {
            inner: Rc::new(TimerInner {
                deadline: Cell::new(monotonic_ms().saturating_add(delay_ms)),
                period: period_ms,
                active: Cell::new(true),
                callback: RefCell::new(Box::new(callback)),
            }),
        };

        event_loop.schedule(timer.clone());
        tracing::trace!(delay_ms, period_ms, "timer started");

        timer
    }

    /// Deactivates the timer. Calling it again has no effect.
    ///
    /// A periodic timer stopped from inside its own callback is not
    /// rescheduled.
    pub fn stop(&self) {
        self.inner.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Next firing time on the monotonic clock.
    pub fn deadline_ms(&self) -> u64 {
        self.inner.deadline.get()
    }

    pub fn period_ms(&self) -> u64 {
        self.inner.period
    }

    /// Fires the timer if it is active and due at `now`.
    ///
    /// Returns whether the callback ran.
    pub(crate) fn fire_if_due(&self, now: u64) -> bool {
        if !self.is_active() || now < self.deadline_ms() {
            return false;
        }

        let Ok(mut callback) = self.inner.callback.try_borrow_mut() else {
            return false;
        };

        let started = monotonic_ms();
        (&mut *callback)(self);
        drop(callback);

        observe::trace("timer", "tick", monotonic_ms().saturating_sub(started), Ok(()));

        if self.is_active() {
            if self.inner.period > 0 {
                self.inner.deadline.set(now.saturating_add(self.inner.period));
            } else {
                self.inner.active.set(false);
            }
        }

        true
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("deadline_ms", &self.deadline_ms())
            .field("period_ms", &self.period_ms())
            .field("active", &self.is_active())
            .finish()
    }
}
