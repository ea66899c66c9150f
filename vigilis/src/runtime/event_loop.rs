use super::builder::LoopBuilder;
use crate::config;
use crate::error::{Error, Result};
use crate::observe;
use crate::reactor::{BackendHint, Poller};
use crate::time::{Timer, monotonic_ms};

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::Rc;

/// A deferred unit of work.
type Task = Box<dyn FnOnce()>;

/// Settings fixed when a loop is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOptions {
    /// Emit a `debug!` summary after every tick.
    pub debug: bool,

    /// Keep running after a failed tick. When false, [`EventLoop::run`]
    /// stops and returns the error.
    pub allow_blocking: bool,

    /// Readiness events fetched per poll.
    pub max_events: usize,

    pub backend: BackendHint,

    /// How long each tick may block in the poller, in milliseconds.
    pub poll_timeout_ms: i32,

    /// Connect timeout of streams on this loop, in milliseconds. `0`
    /// disables it.
    pub default_timeout_ms: u64,
}

impl Default for LoopOptions {
    /// Options derived from the current process-wide configuration.
    fn default() -> Self {
        let config = config::get();

        Self {
            debug: config.debug,
            allow_blocking: config.allow_blocking,
            max_events: config.max_events,
            backend: config.poller_hint,
            poll_timeout_ms: config.poll_timeout_ms,
            default_timeout_ms: config.default_timeout_ms,
        }
    }
}

struct LoopInner {
    options: LoopOptions,
    poller: Poller,
    running: Cell<bool>,
    tasks: RefCell<VecDeque<Task>>,
    timers: RefCell<Vec<Timer>>,
}

/// A single-threaded event loop.
///
/// Each [`tick`](Self::tick) runs three phases in a fixed order:
///
/// 1. every task posted before the tick started, in FIFO order (tasks
///    posted meanwhile wait for the next tick),
/// 2. every active timer whose deadline has passed,
/// 3. one poller wait, bounded by [`LoopOptions::poll_timeout_ms`].
///
/// `EventLoop` is a cheap, clonable handle; every clone drives the same
/// loop. It is neither `Send` nor `Sync`: all of its objects live on the
/// thread that created it.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

impl EventLoop {
    /// Creates a loop with options taken from the process-wide configuration.
    pub fn new() -> Result<Self> {
        Self::with_options(LoopOptions::default())
    }

    /// Returns a builder for customizing the loop.
    pub fn builder() -> LoopBuilder {
        LoopBuilder::new()
    }

    /// Creates a loop with explicit options.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `max_events` is zero,
    /// - any error from opening the [`Poller`].
    pub fn with_options(options: LoopOptions) -> Result<Self> {
        if options.max_events == 0 {
            return Err(Error::Config("max_events must be > 0"));
        }

        let poller = Poller::new(options.backend, options.max_events)?;

        Ok(Self {
            inner: Rc::new(LoopInner {
                options,
                poller,
                running: Cell::new(false),
                tasks: RefCell::new(VecDeque::new()),
                timers: RefCell::new(Vec::new()),
            }),
        })
    }

    /// Appends a task to run on a later tick.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.tasks.borrow_mut().push_back(Box::new(task));
    }

    /// Runs one pass of the loop and returns the number of callbacks
    /// executed: tasks, timer fires and I/O dispatches.
    pub fn tick(&self) -> Result<usize> {
        let tasks = self.run_tasks();
        let timers = self.run_timers();
        let io = self.inner.poller.wait(self.inner.options.poll_timeout_ms)?;

        observe::metric("loop.tasks", tasks as f64);
        observe::metric("loop.io_events", io as f64);

        if self.inner.options.debug {
            tracing::debug!(tasks, timers, io, "tick");
        }

        Ok(tasks + timers + io)
    }

    /// Ticks until [`stop`](Self::stop) is called.
    ///
    /// A failed tick is logged. With `allow_blocking` set, the loop keeps
    /// going; otherwise it stops and the error is returned.
    pub fn run(&self) -> Result<()> {
        self.inner.running.set(true);

        while self.inner.running.get() {
            if let Err(err) = self.tick() {
                tracing::warn!(error = %err, "tick failed");

                if !self.inner.options.allow_blocking {
                    self.inner.running.set(false);
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Stops [`run`](Self::run) once the current tick completes.
    pub fn stop(&self) {
        self.inner.running.set(false);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Number of tasks waiting for the next tick.
    pub fn pending_tasks(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    /// Number of timers still scheduled on this loop.
    pub fn active_timers(&self) -> usize {
        self.inner
            .timers
            .borrow()
            .iter()
            .filter(|timer| timer.is_active())
            .count()
    }

    /// The loop's poller, for registering custom descriptors.
    pub fn poller(&self) -> &Poller {
        &self.inner.poller
    }

    pub fn options(&self) -> &LoopOptions {
        &self.inner.options
    }

    /// Drops every pending task and forgets every timer.
    ///
    /// Timer handles held elsewhere stay valid but never fire again.
    /// Streams are not touched: they must be closed by their owners.
    pub fn destroy(&self) {
        self.stop();

        let tasks = mem::take(&mut *self.inner.tasks.borrow_mut());
        let timers = mem::take(&mut *self.inner.timers.borrow_mut());

        for timer in &timers {
            timer.stop();
        }

        tracing::debug!(
            tasks = tasks.len(),
            timers = timers.len(),
            "loop destroyed"
        );
    }

    pub(crate) fn schedule(&self, timer: Timer) {
        self.inner.timers.borrow_mut().push(timer);
    }

    /// Runs the tasks queued before this call.
    fn run_tasks(&self) -> usize {
        let batch = mem::take(&mut *self.inner.tasks.borrow_mut());
        let count = batch.len();

        for task in batch {
            task();
        }

        count
    }

    /// Fires due timers, then prunes inactive ones.
    fn run_timers(&self) -> usize {
        let snapshot = self.inner.timers.borrow().clone();
        if snapshot.is_empty() {
            return 0;
        }

        let now = monotonic_ms();
        let mut fired = 0;
        for timer in &snapshot {
            if timer.fire_if_due(now) {
                fired += 1;
            }
        }

        self.inner
            .timers
            .borrow_mut()
            .retain(|timer| timer.is_active());

        fired
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("running", &self.is_running())
            .field("pending_tasks", &self.pending_tasks())
            .field("poller", &self.inner.poller)
            .finish()
    }
}
