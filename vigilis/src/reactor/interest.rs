use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// A set of readiness conditions.
///
/// `Interest` is used in both directions: callers register the conditions
/// they want to be told about, and backends report the conditions that
/// actually occurred. [`Interest::ERROR`] is always reported when it
/// happens, whether or not it was requested.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Interest = Interest(0);
    pub const READ: Interest = Interest(1);
    pub const WRITE: Interest = Interest(1 << 1);
    pub const ERROR: Interest = Interest(1 << 2);

    pub const fn is_readable(self) -> bool {
        self.0 & Self::READ.0 != 0
    }

    pub const fn is_writable(self) -> bool {
        self.0 & Self::WRITE.0 != 0
    }

    pub const fn is_error(self) -> bool {
        self.0 & Self::ERROR.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every condition in `other` is also in `self`.
    pub const fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `self` with the conditions of `other` removed.
    pub const fn remove(self, other: Interest) -> Interest {
        Interest(self.0 & !other.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Interest {
    type Output = Interest;

    fn bitand(self, rhs: Interest) -> Interest {
        Interest(self.0 & rhs.0)
    }
}

impl Not for Interest {
    type Output = Interest;

    fn not(self) -> Interest {
        Interest(!self.0 & 0b111)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }

        let mut sep = "";
        for (flag, name) in [
            (Self::READ, "READ"),
            (Self::WRITE, "WRITE"),
            (Self::ERROR, "ERROR"),
        ] {
            if self.contains(flag) {
                write!(f, "{sep}{name}")?;
                sep = " | ";
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_operations() {
        let rw = Interest::READ | Interest::WRITE;
        assert!(rw.is_readable() && rw.is_writable());
        assert!(!rw.is_error());
        assert!(rw.contains(Interest::READ));
        assert_eq!(rw.remove(Interest::READ), Interest::WRITE);
        assert_eq!(rw & Interest::WRITE, Interest::WRITE);
        assert_eq!(!Interest::NONE, rw | Interest::ERROR);
        assert!(Interest::default().is_empty());
    }

    #[test]
    fn debug_lists_flags() {
        assert_eq!(format!("{:?}", Interest::NONE), "NONE");
        assert_eq!(
            format!("{:?}", Interest::READ | Interest::ERROR),
            "READ | ERROR"
        );
    }
}
