//! Process-wide configuration.
//!
//! The configuration is a plain value kept behind a lock. Loops read a
//! snapshot when they are created ([`LoopOptions::default`]), so changing
//! it later only affects loops built afterwards.
//!
//! [`LoopOptions::default`]: crate::LoopOptions

use crate::error::{Error, Result};
use crate::reactor::BackendHint;

use std::sync::{OnceLock, PoisonError, RwLock};

/// Default bound on readiness events fetched per poll.
pub const DEFAULT_MAX_EVENTS: usize = 1024;

/// Default time a loop tick blocks in the poller, in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: i32 = 10;

/// Default timeout for operations that take one, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Library-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Emit per-tick debug summaries.
    pub debug: bool,

    /// Keep running after a failed tick instead of stopping the loop.
    pub allow_blocking: bool,

    /// Readiness events fetched per poll.
    pub max_events: usize,

    pub poller_hint: BackendHint,

    /// How long a tick may block waiting for I/O.
    pub poll_timeout_ms: i32,

    /// How long a stream connect may stay pending before it fails with
    /// [`Error::Timeout`]. `0` waits indefinitely.
    pub default_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            allow_blocking: true,
            max_events: DEFAULT_MAX_EVENTS,
            poller_hint: BackendHint::Auto,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Checks the settings for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.max_events == 0 {
            return Err(Error::Config("max_events must be > 0"));
        }
        if self.poll_timeout_ms < -1 {
            return Err(Error::Config("poll_timeout_ms must be >= -1"));
        }

        Ok(())
    }
}

fn global() -> &'static RwLock<Config> {
    static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();
    CONFIG.get_or_init(|| RwLock::new(Config::default()))
}

/// Returns a snapshot of the current configuration.
pub fn get() -> Config {
    global()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Validates and installs a new configuration.
pub fn set(config: Config) -> Result<()> {
    config.validate()?;

    *global().write().unwrap_or_else(PoisonError::into_inner) = config;
    tracing::debug!("configuration updated");

    Ok(())
}

/// Capabilities compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub epoll: bool,
    pub kqueue: bool,
    /// The Windows facility (served by `WSAPoll`).
    pub iocp: bool,
    pub poll: bool,
    /// TLS hooks are not provided.
    pub tls: bool,
}

/// Reports the capabilities of this build.
pub fn features() -> Features {
    Features {
        epoll: BackendHint::Epoll.is_available(),
        kqueue: BackendHint::Kqueue.is_available(),
        iocp: BackendHint::Iocp.is_available(),
        poll: BackendHint::Poll.is_available(),
        tls: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_events_is_rejected() {
        let config = Config {
            max_events: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn some_backend_is_available() {
        let f = features();
        assert!(f.epoll || f.kqueue || f.iocp || f.poll);
        assert!(!f.tls);
    }
}
