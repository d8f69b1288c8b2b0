/*!
 * Core Types
 * Interest flags and readiness events shared by every backend
 */

use serde::{Deserialize, Serialize};
use std::os::unix::io::RawFd;

/// Operations a caller wants to be notified about for a descriptor.
///
/// Error and hangup conditions are always reported for a registered
/// descriptor regardless of interest; these flags only control read and
/// write readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub const READ: Self = Self {
        read: true,
        write: false,
    };
    pub const WRITE: Self = Self {
        read: false,
        write: true,
    };
    pub const BOTH: Self = Self {
        read: true,
        write: true,
    };

    /// Apply partial overrides, keeping flags that are `None` unchanged.
    pub(crate) fn updated(self, read: Option<bool>, write: Option<bool>) -> Self {
        Self {
            read: read.unwrap_or(self.read),
            write: write.unwrap_or(self.write),
        }
    }
}

/// A single ready descriptor as yielded by `wait`.
///
/// `readable` is the union of read-ready, hangup, and error conditions:
/// a broken descriptor surfaces through the read path so the caller
/// discovers the failure on its next read attempt. `writable` is exactly
/// write-ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
}

/// Outcome of a single `wait` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Exactly one ready descriptor; call `wait` again for the next one.
    Ready(Readiness),
    /// Nothing became ready within the timeout.
    Timeout,
    /// The blocking call was cut short by signal delivery; not a failure,
    /// the caller is expected to retry.
    Interrupted,
}

impl Wait {
    /// The ready descriptor, if this outcome carries one.
    pub fn ready(self) -> Option<Readiness> {
        match self {
            Self::Ready(event) => Some(event),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interest_partial_update() {
        let both = Interest::READ.updated(None, Some(true));
        assert_eq!(both, Interest::BOTH);

        let unchanged = Interest::WRITE.updated(None, None);
        assert_eq!(unchanged, Interest::WRITE);

        let cleared = Interest::BOTH.updated(Some(false), Some(false));
        assert!(!cleared.read);
        assert!(!cleared.write);
    }

    #[test]
    fn test_wait_ready_accessor() {
        let event = Readiness {
            fd: 4,
            readable: true,
            writable: false,
        };
        assert_eq!(Wait::Ready(event).ready(), Some(event));
        assert_eq!(Wait::Timeout.ready(), None);
        assert_eq!(Wait::Interrupted.ready(), None);
    }
}
