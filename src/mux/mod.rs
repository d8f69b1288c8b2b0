/*!
 * Readiness Multiplexer
 * One public contract, three compile-time backend strategies
 *
 * The platform default is chosen by capability, in order of preference:
 * epoll on Linux-family kernels, poll elsewhere on Unix, select as the
 * most portable floor. Every Unix-portable backend compiles wherever it
 * can so the whole contract is testable on one host, but the factory
 * binds exactly one per build.
 */

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod epoll;
pub mod poll_list;
pub mod select;

use crate::core::errors::MuxError;
use crate::core::types::{Interest, Wait};
use serde::{Deserialize, Serialize};
use std::os::unix::io::RawFd;
use std::time::Duration;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use epoll::EpollMux;
pub use poll_list::PollMux;
pub use select::SelectMux;

/// Backend selected for this platform at compile time.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub type PlatformMux = EpollMux;

/// Backend selected for this platform at compile time.
#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
pub type PlatformMux = PollMux;

/// Create the preferred multiplexer for this platform.
///
/// Construction is fallible only where a kernel resource has to be
/// acquired; the caller decides whether to retry or give up.
pub fn new() -> Result<PlatformMux, MuxError> {
    PlatformMux::new()
}

/// Counter snapshot for one multiplexer instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxStats {
    /// Blocking calls made into the OS primitive
    pub os_polls: u64,
    /// Ready descriptors handed to the caller
    pub events_yielded: u64,
    /// Waits that elapsed with nothing ready
    pub timeouts: u64,
    /// Waits cut short by signal delivery
    pub interruptions: u64,
}

/// The backend-independent contract.
///
/// An instance is single-threaded by design: it holds mutable scan
/// cursors and registration tables with no internal locking, which the
/// `&mut self` receivers encode in the type system. Registered
/// descriptors are never closed by the multiplexer; remove a descriptor
/// before closing it.
pub trait Multiplexer {
    /// Register a descriptor with the given interest.
    ///
    /// Fails with EBADF for a negative descriptor, EEXIST if already
    /// registered, and EMFILE where the backend has a fixed capacity
    /// that is exhausted. Error and hangup notification is implicit and
    /// cannot be opted out of.
    fn add(&mut self, fd: RawFd, interest: Interest) -> Result<(), MuxError>;

    /// Change interest flags for a registered descriptor.
    ///
    /// `None` leaves a flag unchanged; `Some` sets it. Fails with ENOENT
    /// if the descriptor is not registered.
    fn modify(&mut self, fd: RawFd, read: Option<bool>, write: Option<bool>)
        -> Result<(), MuxError>;

    /// Deregister a descriptor. Fails with ENOENT if not registered.
    ///
    /// No stale ready event for the descriptor will be yielded by a
    /// later `wait`.
    fn remove(&mut self, fd: RawFd) -> Result<(), MuxError>;

    /// Yield at most one ready descriptor.
    ///
    /// Previously fetched events are drained before the OS is consulted
    /// again; when the drain is empty, blocks in the OS primitive for up
    /// to `timeout`. Returns `Wait::Timeout` when nothing became ready
    /// and `Wait::Interrupted` when a signal cut the block short (the
    /// caller retries; the library never retries internally).
    fn wait(&mut self, timeout: Duration) -> Result<Wait, MuxError>;

    /// Identity of the active backend: "epoll", "poll", or "select".
    fn name(&self) -> &'static str;

    /// Raw descriptor of the kernel notification resource, where one
    /// exists, so the instance can itself be nested inside an outer
    /// selector.
    fn queue_fd(&self) -> Option<RawFd> {
        None
    }

    /// Number of live registrations.
    fn registered(&self) -> usize;

    /// Counter snapshot for diagnostics and tests.
    fn stats(&self) -> MuxStats;
}

/// Millisecond timeout for epoll_wait/poll; sub-millisecond remainders
/// truncate.
pub(crate) fn timeout_millis(timeout: Duration) -> i32 {
    timeout.as_millis().min(i32::MAX as u128) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_factory() {
        let mux = new().expect("platform multiplexer");
        #[cfg(any(target_os = "linux", target_os = "android"))]
        assert_eq!(mux.name(), "epoll");
        #[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
        assert_eq!(mux.name(), "poll");
        assert_eq!(mux.registered(), 0);
    }

    #[test]
    fn test_timeout_scaling() {
        assert_eq!(timeout_millis(Duration::from_millis(100)), 100);
        assert_eq!(timeout_millis(Duration::from_secs_f64(0.1)), 100);
        assert_eq!(timeout_millis(Duration::ZERO), 0);
        // Sub-millisecond remainders truncate
        assert_eq!(timeout_millis(Duration::from_micros(2500)), 2);
        assert_eq!(timeout_millis(Duration::MAX), i32::MAX);
    }
}
