#![allow(dead_code)]

/*!
 * Shared Test Helpers
 * Backend enumeration and byte-channel plumbing for the contract tests
 */

use fdmux::Multiplexer;
use std::os::unix::net::UnixStream;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Connected byte-channel pair; both ends are pollable descriptors.
pub fn pair() -> (UnixStream, UnixStream) {
    UnixStream::pair().expect("socketpair")
}

/// Every backend buildable on this host, boxed behind the contract.
/// The factory binds one backend per build, but the whole contract is
/// exercised against each strategy.
pub fn backends() -> Vec<Box<dyn Multiplexer>> {
    let mut all: Vec<Box<dyn Multiplexer>> = Vec::new();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    all.push(Box::new(fdmux::EpollMux::new().expect("epoll instance")));
    all.push(Box::new(fdmux::PollMux::new().expect("poll instance")));
    all.push(Box::new(fdmux::SelectMux::new().expect("select instance")));
    all
}
