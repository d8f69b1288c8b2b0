/*!
 * Limits and Constants
 *
 * Centralized location for the capacities and ceilings of the backend
 * strategies. Values include rationale comments explaining why they exist.
 */

/// Ready events fetched from the kernel in a single epoll_wait call.
/// The drain cursor walks this batch one event per wait() call.
/// [PERF] 64 events (768 bytes) stays cache-friendly while amortizing
/// syscalls under load.
pub const MAX_BATCH_EVENTS: usize = 64;

/// Default registration capacity for the poll-list backend.
/// Each record is one pollfd (8 bytes); registration beyond this count
/// fails with EMFILE. Override per instance with `PollMux::with_capacity`.
pub const DEFAULT_POLL_CAPACITY: usize = 4096;

/// Highest descriptor number the select backend can watch (exclusive).
/// Dictated by the platform's fd_set width; descriptors at or above this
/// ceiling are rejected with EBADF.
pub const FD_SETSIZE: usize = libc::FD_SETSIZE;
