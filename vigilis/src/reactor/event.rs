use super::interest::Interest;
use super::poller::platform::RawFd;

/// A readiness notification produced by a [`Reactor`](super::Reactor).
///
/// Backends report readiness by descriptor, already translated into the
/// portable [`Interest`] vocabulary: hang-ups surface as readable so the
/// owner observes end-of-file through its next read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Descriptor that became ready.
    pub fd: RawFd,

    /// Conditions that occurred.
    pub ready: Interest,
}

impl Event {
    pub fn new(fd: RawFd, ready: Interest) -> Self {
        Self { fd, ready }
    }
}
