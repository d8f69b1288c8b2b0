/*!
 * Epoll Backend
 * Edge/level-queue strategy: a kernel registration handle plus a bounded
 * batch of ready events drained one per wait() call
 */

use super::{timeout_millis, Multiplexer, MuxStats};
use crate::core::errors::MuxError;
use crate::core::limits::MAX_BATCH_EVENTS;
use crate::core::types::{Interest, Readiness, Wait};
use log::{debug, info, warn};
use nix::errno::Errno;
use std::collections::HashMap;
use std::fmt;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Readable union: data, peer hangup, or error. A broken descriptor is
/// surfaced through the read path.
const READABLE_EVENTS: u32 =
    (libc::EPOLLIN | libc::EPOLLHUP | libc::EPOLLRDHUP | libc::EPOLLERR) as u32;

/// Multiplexer backed by a kernel epoll instance.
pub struct EpollMux {
    /// Owned kernel handle; closed exactly once on drop.
    epfd: OwnedFd,
    /// fd -> interest. Authoritative for EEXIST/ENOENT checks and for
    /// partial `modify` updates.
    registrations: HashMap<RawFd, Interest>,
    /// Raw events fetched by the last epoll_wait call.
    batch: Vec<libc::epoll_event>,
    /// How many entries of `batch` remain to be yielded; counts down.
    pending: usize,
    stats: MuxStats,
}

impl EpollMux {
    pub fn new() -> Result<Self, MuxError> {
        let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if raw < 0 {
            return Err(MuxError::last_os());
        }
        // Safety: epoll_create1 returned a fresh descriptor we now own.
        let epfd = unsafe { OwnedFd::from_raw_fd(raw) };
        info!("epoll multiplexer initialized (fd {})", raw);

        Ok(Self {
            epfd,
            registrations: HashMap::new(),
            batch: vec![libc::epoll_event { events: 0, u64: 0 }; MAX_BATCH_EVENTS],
            pending: 0,
            stats: MuxStats::default(),
        })
    }

    /// Interest flags to an epoll event mask. Error and hangup
    /// notification is unconditional.
    fn interest_events(interest: Interest) -> u32 {
        let mut events = (libc::EPOLLERR | libc::EPOLLHUP | libc::EPOLLRDHUP) as u32;
        if interest.read {
            events |= libc::EPOLLIN as u32;
        }
        if interest.write {
            events |= libc::EPOLLOUT as u32;
        }
        events
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32) -> Result<(), MuxError> {
        let mut event = libc::epoll_event {
            events,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut event) };
        if ret < 0 {
            Err(MuxError::last_os())
        } else {
            Ok(())
        }
    }

    /// Next undelivered event from the fetched batch, skipping entries
    /// invalidated by `remove`.
    fn next_pending(&mut self) -> Option<Readiness> {
        while self.pending > 0 {
            self.pending -= 1;
            let event = self.batch[self.pending];
            if event.events == 0 {
                continue;
            }
            return Some(Readiness {
                fd: event.u64 as RawFd,
                readable: event.events & READABLE_EVENTS != 0,
                writable: event.events & libc::EPOLLOUT as u32 != 0,
            });
        }
        None
    }
}

impl Multiplexer for EpollMux {
    fn add(&mut self, fd: RawFd, interest: Interest) -> Result<(), MuxError> {
        if fd < 0 {
            return Err(MuxError::BadDescriptor(fd));
        }
        if self.registrations.contains_key(&fd) {
            return Err(MuxError::AlreadyRegistered(fd));
        }

        self.ctl(libc::EPOLL_CTL_ADD, fd, Self::interest_events(interest))?;
        self.registrations.insert(fd, interest);
        debug!(
            "epoll: watching fd {} (read={}, write={})",
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
        let current = *self
            .registrations
            .get(&fd)
            .ok_or(MuxError::NotRegistered(fd))?;
        let updated = current.updated(read, write);

        self.ctl(libc::EPOLL_CTL_MOD, fd, Self::interest_events(updated))?;
        self.registrations.insert(fd, updated);
        Ok(())
    }

    fn remove(&mut self, fd: RawFd) -> Result<(), MuxError> {
        if self.registrations.remove(&fd).is_none() {
            return Err(MuxError::NotRegistered(fd));
        }

        // Invalidate any event for this fd still sitting in the fetched
        // batch so a later drain cannot yield it.
        for event in &mut self.batch[..self.pending] {
            if event.u64 as RawFd == fd {
                event.events = 0;
            }
        }

        let mut event = libc::epoll_event {
            events: 0,
            u64: fd as u64,
        };
        let ret = unsafe {
            libc::epoll_ctl(self.epfd.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, &mut event)
        };
        if ret < 0 {
            // The caller may already have closed the fd, in which case
            // the kernel has dropped the registration on its own.
            let errno = Errno::last();
            if errno != Errno::ENOENT && errno != Errno::EBADF {
                let err = MuxError::last_os();
                warn!("epoll: failed to deregister fd {}: {}", fd, err);
                return Err(err);
            }
        }

        debug!("epoll: stopped watching fd {}", fd);
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<Wait, MuxError> {
        if let Some(event) = self.next_pending() {
            self.stats.events_yielded += 1;
            return Ok(Wait::Ready(event));
        }

        let n = unsafe {
            libc::epoll_wait(
                self.epfd.as_raw_fd(),
                self.batch.as_mut_ptr(),
                MAX_BATCH_EVENTS as libc::c_int,
                timeout_millis(timeout),
            )
        };
        self.stats.os_polls += 1;

        if n == 0 {
            self.stats.timeouts += 1;
            return Ok(Wait::Timeout);
        }
        if n < 0 {
            if Errno::last() == Errno::EINTR {
                self.stats.interruptions += 1;
                return Ok(Wait::Interrupted);
            }
            let err = MuxError::last_os();
            warn!("epoll_wait failed: {}", err);
            return Err(err);
        }

        self.pending = n as usize;
        match self.next_pending() {
            Some(event) => {
                self.stats.events_yielded += 1;
                Ok(Wait::Ready(event))
            }
            // The kernel reported n > 0, so the batch always yields.
            None => {
                self.stats.timeouts += 1;
                Ok(Wait::Timeout)
            }
        }
    }

    fn name(&self) -> &'static str {
        "epoll"
    }

    fn queue_fd(&self) -> Option<RawFd> {
        Some(self.epfd.as_raw_fd())
    }

    fn registered(&self) -> usize {
        self.registrations.len()
    }

    fn stats(&self) -> MuxStats {
        self.stats
    }
}

impl fmt::Display for EpollMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "multiplexer<epoll> ({} registered)",
            self.registrations.len()
        )
    }
}

impl fmt::Debug for EpollMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpollMux")
            .field("epfd", &self.epfd.as_raw_fd())
            .field("registered", &self.registrations.len())
            .field("pending", &self.pending)
            .finish()
    }
}
