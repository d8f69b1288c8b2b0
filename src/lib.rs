/*!
 * fdmux Library
 * Unified readiness multiplexing over epoll, poll, and select
 *
 * One multiplexer contract, three mutually-exclusive backend strategies
 * selected by platform capability at compile time. An instance answers
 * "which registered descriptors are ready, and for what operations"
 * given a timeout; it schedules no timers, dispatches no callbacks, and
 * never closes a registered descriptor.
 */

pub mod core;
pub mod mux;

// Re-exports
pub use crate::core::errors::{MuxError, EBADF, EEXIST, EMFILE, ENOENT};
pub use crate::core::types::{Interest, Readiness, Wait};
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use crate::mux::EpollMux;
pub use crate::mux::{new, Multiplexer, MuxStats, PlatformMux, PollMux, SelectMux};
