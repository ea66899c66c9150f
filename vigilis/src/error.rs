//! Error taxonomy shared by every reactor component.
//!
//! Operations report failures synchronously through [`Result`]. The
//! [`Error`] enum carries one variant per failure kind; [`ErrorKind`] is
//! its `Copy` discriminant, used where a reason must be stored and handed
//! out more than once (future rejections, cancellation reasons).

use std::collections::TryReserveError;
use std::fmt;
use std::io;

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The kind of a failure, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Generic,
    Alloc,
    InvalidState,
    Io,
    Timeout,
    Canceled,
    Closed,
    WouldBlock,
    Protocol,
    NotSupported,
    Config,
    InvalidArgument,
    OutOfRange,
    Internal,
}

impl ErrorKind {
    /// Short, stable name suitable for logs and metric keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Generic => "generic",
            ErrorKind::Alloc => "alloc",
            ErrorKind::InvalidState => "invalid-state",
            ErrorKind::Io => "io",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Closed => "closed",
            ErrorKind::WouldBlock => "would-block",
            ErrorKind::Protocol => "protocol",
            ErrorKind::NotSupported => "not-supported",
            ErrorKind::Config => "config",
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::OutOfRange => "out-of-range",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by the reactor, its streams or its primitives.
#[derive(Debug, Error)]
pub enum Error {
    #[error("operation failed")]
    Generic,

    /// Growing a buffer or registry failed.
    #[error("allocation failed: {0}")]
    Alloc(#[source] TryReserveError),

    /// The object is not in a state that allows the operation.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// An OS call failed. The original error, including its raw code, is kept.
    #[error("i/o failure: {0}")]
    Io(#[source] io::Error),

    #[error("operation timed out")]
    Timeout,

    #[error("operation canceled")]
    Canceled,

    /// The stream was closed, or its peer reached end-of-file.
    #[error("stream closed")]
    Closed,

    /// The operation cannot make progress right now; retry later.
    #[error("operation would block")]
    WouldBlock,

    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    #[error("not supported: {0}")]
    NotSupported(&'static str),

    #[error("invalid configuration: {0}")]
    Config(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("out of range: {0}")]
    OutOfRange(&'static str),

    #[error("internal inconsistency: {0}")]
    Internal(&'static str),
}

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Generic => ErrorKind::Generic,
            Error::Alloc(_) => ErrorKind::Alloc,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Io(_) => ErrorKind::Io,
            Error::Timeout => ErrorKind::Timeout,
            Error::Canceled => ErrorKind::Canceled,
            Error::Closed => ErrorKind::Closed,
            Error::WouldBlock => ErrorKind::WouldBlock,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::NotSupported(_) => ErrorKind::NotSupported,
            Error::Config(_) => ErrorKind::Config,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::OutOfRange(_) => ErrorKind::OutOfRange,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the raw OS error code behind an [`Error::Io`], if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::WouldBlock => true,
            Error::Io(err) => err.kind() == io::ErrorKind::Interrupted,
            _ => false,
        }
    }
}

impl From<io::Error> for Error {
    /// Classifies an OS error: would-block stays distinguishable from
    /// genuine I/O failures.
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::WouldBlock {
            Error::WouldBlock
        } else {
            Error::Io(err)
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(err: TryReserveError) -> Self {
        Error::Alloc(err)
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Generic => Error::Generic,
            Error::Alloc(err) => Error::Alloc(err.clone()),
            Error::InvalidState(msg) => Error::InvalidState(msg),
            Error::Io(err) => Error::Io(match err.raw_os_error() {
                Some(code) => io::Error::from_raw_os_error(code),
                None => io::Error::new(err.kind(), err.to_string()),
            }),
            Error::Timeout => Error::Timeout,
            Error::Canceled => Error::Canceled,
            Error::Closed => Error::Closed,
            Error::WouldBlock => Error::WouldBlock,
            Error::Protocol(msg) => Error::Protocol(msg),
            Error::NotSupported(msg) => Error::NotSupported(msg),
            Error::Config(msg) => Error::Config(msg),
            Error::InvalidArgument(msg) => Error::InvalidArgument(msg),
            Error::OutOfRange(msg) => Error::OutOfRange(msg),
            Error::Internal(msg) => Error::Internal(msg),
        }
    }
}
