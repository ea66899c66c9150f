use super::clock::monotonic_ms;

/// An absolute point on the monotonic clock.
///
/// Deadlines compare by time, so the earliest one sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline {
    at_ms: u64,
}

impl Deadline {
    /// A deadline `delta_ms` milliseconds from now.
    pub fn from_now(delta_ms: u64) -> Self {
        Self::at(monotonic_ms().saturating_add(delta_ms))
    }

    /// A deadline at an absolute monotonic timestamp.
    pub fn at(at_ms: u64) -> Self {
        Self { at_ms }
    }

    /// The absolute monotonic timestamp of this deadline.
    pub fn at_ms(&self) -> u64 {
        self.at_ms
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        self.expired_at(monotonic_ms())
    }

    /// Whether the deadline has passed at the monotonic time `now`.
    pub fn expired_at(&self, now: u64) -> bool {
        now >= self.at_ms
    }

    /// Milliseconds left before expiry, zero once expired.
    pub fn remaining_ms(&self) -> u64 {
        self.remaining_at(monotonic_ms())
    }

    /// Milliseconds left before expiry at the monotonic time `now`.
    pub fn remaining_at(&self, now: u64) -> u64 {
        self.at_ms.saturating_sub(now)
    }
}
