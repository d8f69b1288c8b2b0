/*!
 * Poll-List Backend
 * Portable strategy: a dense, unordered array of pollfd records with
 * swap-remove compaction and a drain cursor
 */

use super::{timeout_millis, Multiplexer, MuxStats};
use crate::core::errors::MuxError;
use crate::core::limits::DEFAULT_POLL_CAPACITY;
use crate::core::types::{Interest, Readiness, Wait};
use log::{debug, info, warn};
use nix::errno::Errno;
use std::fmt;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Readable union: data, peer hangup, error, or a descriptor the kernel
/// declared invalid. All of them surface through the read path.
const READABLE_EVENTS: libc::c_short =
    libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;

/// Multiplexer backed by poll(2) over a bounded record list.
pub struct PollMux {
    /// Live records, unordered; poll(2) reads interest from and writes
    /// readiness into them in place.
    records: Vec<libc::pollfd>,
    capacity: usize,
    /// Index of the next record to examine while draining.
    cursor: usize,
    stats: MuxStats,
}

impl PollMux {
    pub fn new() -> Result<Self, MuxError> {
        Ok(Self::with_capacity(DEFAULT_POLL_CAPACITY))
    }

    /// Instance with an explicit registration bound.
    pub fn with_capacity(capacity: usize) -> Self {
        info!("poll multiplexer initialized (capacity {})", capacity);
        Self {
            records: Vec::new(),
            capacity,
            cursor: 0,
            stats: MuxStats::default(),
        }
    }

    /// Registration bound for this instance.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn interest_events(interest: Interest) -> libc::c_short {
        let mut events = 0;
        if interest.read {
            events |= libc::POLLIN;
        }
        if interest.write {
            events |= libc::POLLOUT;
        }
        events
    }

    fn position(&self, fd: RawFd) -> Option<usize> {
        self.records.iter().position(|record| record.fd == fd)
    }

    /// Next record with unconsumed readiness, scanning from the cursor.
    fn next_pending(&mut self) -> Option<Readiness> {
        while self.cursor < self.records.len() {
            let index = self.cursor;
            self.cursor += 1;

            let revents = self.records[index].revents;
            if revents == 0 {
                continue;
            }
            self.records[index].revents = 0;
            return Some(Readiness {
                fd: self.records[index].fd,
                readable: revents & READABLE_EVENTS != 0,
                writable: revents & libc::POLLOUT != 0,
            });
        }
        None
    }
}

impl Multiplexer for PollMux {
    fn add(&mut self, fd: RawFd, interest: Interest) -> Result<(), MuxError> {
        if fd < 0 {
            return Err(MuxError::BadDescriptor(fd));
        }
        if self.position(fd).is_some() {
            return Err(MuxError::AlreadyRegistered(fd));
        }
        if self.records.len() >= self.capacity {
            return Err(MuxError::CapacityExhausted {
                count: self.records.len(),
                capacity: self.capacity,
            });
        }

        self.records.push(libc::pollfd {
            fd,
            events: Self::interest_events(interest),
            revents: 0,
        });
        debug!(
            "poll: watching fd {} (read={}, write={})",
            fd, interest.read, interest.write
        );
        Ok(())
    }

    fn modify(
        &mut self,
        fd: RawFd,
        read: Option<bool>,
        write: Option<bool>,
    ) -> Result<(), MuxError> {
        let index = self.position(fd).ok_or(MuxError::NotRegistered(fd))?;
        let record = &mut self.records[index];

        let current = Interest {
            read: record.events & libc::POLLIN != 0,
            write: record.events & libc::POLLOUT != 0,
        };
        record.events = Self::interest_events(current.updated(read, write));
        Ok(())
    }

    fn remove(&mut self, fd: RawFd) -> Result<(), MuxError> {
        let index = self.position(fd).ok_or(MuxError::NotRegistered(fd))?;

        // Swap-with-last and shrink. The removed record's unconsumed
        // revents vanish with it, so no stale event can be drained; the
        // record moved into the hole keeps its own pending state.
        self.records.swap_remove(index);
        debug!("poll: stopped watching fd {}", fd);
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<Wait, MuxError> {
        if let Some(event) = self.next_pending() {
            self.stats.events_yielded += 1;
            return Ok(Wait::Ready(event));
        }

        let ret = unsafe {
            libc::poll(
                self.records.as_mut_ptr(),
                self.records.len() as libc::nfds_t,
                timeout_millis(timeout),
            )
        };
        self.stats.os_polls += 1;

        if ret == 0 {
            self.stats.timeouts += 1;
            return Ok(Wait::Timeout);
        }
        if ret < 0 {
            if Errno::last() == Errno::EINTR {
                self.stats.interruptions += 1;
                return Ok(Wait::Interrupted);
            }
            let err = MuxError::last_os();
            warn!("poll failed: {}", err);
            return Err(err);
        }

        self.cursor = 0;
        match self.next_pending() {
            Some(event) => {
                self.stats.events_yielded += 1;
                Ok(Wait::Ready(event))
            }
            // poll reported ret > 0, so a record always matches.
            None => {
                self.stats.timeouts += 1;
                Ok(Wait::Timeout)
            }
        }
    }

    fn name(&self) -> &'static str {
        "poll"
    }

    fn registered(&self) -> usize {
        self.records.len()
    }

    fn stats(&self) -> MuxStats {
        self.stats
    }
}

impl fmt::Display for PollMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "multiplexer<poll> ({} registered)", self.records.len())
    }
}

impl fmt::Debug for PollMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollMux")
            .field("registered", &self.records.len())
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation() {
        let mux = PollMux::new().expect("poll instance");
        assert_eq!(mux.name(), "poll");
        assert_eq!(mux.capacity(), DEFAULT_POLL_CAPACITY);
        assert_eq!(mux.registered(), 0);
        assert!(mux.queue_fd().is_none());
    }

    #[test]
    fn test_interest_events() {
        assert_eq!(PollMux::interest_events(Interest::READ), libc::POLLIN);
        assert_eq!(PollMux::interest_events(Interest::WRITE), libc::POLLOUT);
        assert_eq!(
            PollMux::interest_events(Interest::BOTH),
            libc::POLLIN | libc::POLLOUT
        );
    }

    #[test]
    fn test_display_identity() {
        let mut mux = PollMux::with_capacity(4);
        assert_eq!(mux.to_string(), "multiplexer<poll> (0 registered)");
        mux.add(10, Interest::READ).unwrap();
        assert_eq!(mux.to_string(), "multiplexer<poll> (1 registered)");
    }

    #[test]
    fn test_modify_keeps_unspecified_flags() {
        // Registration bookkeeping needs no live descriptor.
        let mut mux = PollMux::with_capacity(4);
        mux.add(10, Interest::READ).unwrap();

        mux.modify(10, None, Some(true)).unwrap();
        assert_eq!(
            mux.records[0].events,
            libc::POLLIN | libc::POLLOUT,
            "read interest must survive a write-only update"
        );

        mux.modify(10, Some(false), None).unwrap();
        assert_eq!(mux.records[0].events, libc::POLLOUT);
    }
}
