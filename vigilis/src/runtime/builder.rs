use super::{EventLoop, LoopOptions};
use crate::error::Result;
use crate::reactor::BackendHint;

/// Builder for configuring and creating an event loop.
///
/// `LoopBuilder` starts from the process-wide configuration snapshot
/// and lets individual settings be overridden before the loop is built.
///
/// # Examples
///
/// ```rust,ignore
/// let event_loop = LoopBuilder::new()
///     .max_events(256)
///     .poll_timeout_ms(1)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct LoopBuilder {
    options: LoopOptions,
}

impl LoopBuilder {
    /// Creates a builder seeded from [`config::get`](crate::config::get).
    pub fn new() -> Self {
        Self {
            options: LoopOptions::default(),
        }
    }

    /// Enables per-tick debug summaries.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.options.debug = enabled;
        self
    }

    /// Whether [`EventLoop::run`] keeps going after a failed tick.
    pub fn allow_blocking(mut self, allowed: bool) -> Self {
        self.options.allow_blocking = allowed;
        self
    }

    /// Sets the number of readiness events fetched per poll.
    ///
    /// Zero is rejected by [`build`](Self::build).
    pub fn max_events(mut self, n: usize) -> Self {
        self.options.max_events = n;
        self
    }

    /// Selects the OS readiness facility.
    pub fn backend(mut self, hint: BackendHint) -> Self {
        self.options.backend = hint;
        self
    }

    /// Sets how long a tick may block waiting for I/O.
    pub fn poll_timeout_ms(mut self, ms: i32) -> Self {
        self.options.poll_timeout_ms = ms;
        self
    }

    /// Sets the connect timeout of streams on this loop; `0` disables it.
    pub fn default_timeout_ms(mut self, ms: u64) -> Self {
        self.options.default_timeout_ms = ms;
        self
    }

    /// Builds the loop with the configured options.
    pub fn build(self) -> Result<EventLoop> {
        EventLoop::with_options(self.options)
    }
}

impl Default for LoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
