/*!
 * Select Backend
 * Most portable strategy: six fixed-width descriptor bitmaps bounded by
 * FD_SETSIZE, with a descriptor-number drain cursor
 */

use super::{Multiplexer, MuxStats};
use crate::core::errors::MuxError;
use crate::core::limits::FD_SETSIZE;
use crate::core::types::{Interest, Readiness, Wait};
use log::{debug, info, warn};
use nix::errno::Errno;
use std::fmt;
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Safe view over the platform fd_set bitmap.
#[derive(Clone, Copy)]
struct DescriptorSet(libc::fd_set);

impl DescriptorSet {
    fn new() -> Self {
        let mut set = MaybeUninit::<libc::fd_set>::uninit();
        // Safety: FD_ZERO initializes the whole set.
        unsafe {
            libc::FD_ZERO(set.as_mut_ptr());
            Self(set.assume_init())
        }
    }

    fn insert(&mut self, fd: RawFd) {
        unsafe { libc::FD_SET(fd, &mut self.0) }
    }

    fn remove(&mut self, fd: RawFd) {
        unsafe { libc::FD_CLR(fd, &mut self.0) }
    }

    fn contains(&self, fd: RawFd) -> bool {
        unsafe { libc::FD_ISSET(fd, &self.0) }
    }

    fn as_mut_ptr(&mut self) -> *mut libc::fd_set {
        &mut self.0
    }
}

/// Multiplexer backed by select(2) over fixed-width descriptor sets.
pub struct SelectMux {
    /// Interest bitmaps, stable across waits.
    want_read: DescriptorSet,
    want_write: DescriptorSet,
    /// Membership bitmap; a descriptor is registered iff it is set here.
    all: DescriptorSet,
    /// Scratch bitmaps select(2) writes readiness into.
    readable: DescriptorSet,
    writable: DescriptorSet,
    errored: DescriptorSet,
    /// Next descriptor number to examine while draining; FD_SETSIZE
    /// means the scratch sets are exhausted.
    cursor: usize,
    registered: usize,
    stats: MuxStats,
}

impl SelectMux {
    pub fn new() -> Result<Self, MuxError> {
        info!("select multiplexer initialized (ceiling {})", FD_SETSIZE);
        Ok(Self {
            want_read: DescriptorSet::new(),
            want_write: DescriptorSet::new(),
            all: DescriptorSet::new(),
            readable: DescriptorSet::new(),
            writable: DescriptorSet::new(),
            errored: DescriptorSet::new(),
            cursor: FD_SETSIZE,
            registered: 0,
            stats: MuxStats::default(),
        })
    }

    /// Next descriptor with unconsumed readiness, scanning upwards from
    /// the cursor. Error conditions count as readable.
    fn next_pending(&mut self) -> Option<Readiness> {
        while self.cursor < FD_SETSIZE {
            let fd = self.cursor as RawFd;
            self.cursor += 1;

            let read_hit = self.readable.contains(fd);
            let write_hit = self.writable.contains(fd);
            let error_hit = self.errored.contains(fd);
            if !(read_hit || write_hit || error_hit) {
                continue;
            }

            self.readable.remove(fd);
            self.writable.remove(fd);
            self.errored.remove(fd);
            return Some(Readiness {
                fd,
                readable: read_hit || error_hit,
                writable: write_hit,
            });
        }
        None
    }
}

impl Multiplexer for SelectMux {
    fn add(&mut self, fd: RawFd, interest: Interest) -> Result<(), MuxError> {
        if fd < 0 || fd as usize >= FD_SETSIZE {
            return Err(MuxError::BadDescriptor(fd));
        }
        if self.all.contains(fd) {
            return Err(MuxError::AlreadyRegistered(fd));
        }

        // A previous incarnation of this descriptor number must not leak
        // ready bits into the new registration.
        self.readable.remove(fd);
        self.writable.remove(fd);
        self.errored.remove(fd);

        self.all.insert(fd);
        if interest.read {
            self.want_read.insert(fd);
        } else {
            self.want_read.remove(fd);
        }
        if interest.write {
            self.want_write.insert(fd);
        } else {
            self.want_write.remove(fd);
        }

        self.registered += 1;
        debug!(
            "select: watching fd {} (read={}, write={})",
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
        if fd < 0 || fd as usize >= FD_SETSIZE || !self.all.contains(fd) {
            return Err(MuxError::NotRegistered(fd));
        }

        if let Some(read) = read {
            if read {
                self.want_read.insert(fd);
            } else {
                self.want_read.remove(fd);
            }
        }
        if let Some(write) = write {
            if write {
                self.want_write.insert(fd);
            } else {
                self.want_write.remove(fd);
            }
        }
        Ok(())
    }

    fn remove(&mut self, fd: RawFd) -> Result<(), MuxError> {
        if fd < 0 || fd as usize >= FD_SETSIZE || !self.all.contains(fd) {
            return Err(MuxError::NotRegistered(fd));
        }

        // Clear every bitmap, scratch included, so no stale ready bit
        // can be drained for this descriptor.
        self.want_read.remove(fd);
        self.want_write.remove(fd);
        self.readable.remove(fd);
        self.writable.remove(fd);
        self.errored.remove(fd);
        self.all.remove(fd);

        self.registered -= 1;
        debug!("select: stopped watching fd {}", fd);
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<Wait, MuxError> {
        if let Some(event) = self.next_pending() {
            self.stats.events_yielded += 1;
            return Ok(Wait::Ready(event));
        }

        // select(2) mutates the sets passed to it, so the scratch sets
        // are refreshed from the interest sets before every call. Errors
        // are watched for every registered descriptor, not just those
        // with read or write interest.
        self.readable = self.want_read;
        self.writable = self.want_write;
        self.errored = self.all;

        let mut tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };
        let ret = unsafe {
            libc::select(
                FD_SETSIZE as libc::c_int,
                self.readable.as_mut_ptr(),
                self.writable.as_mut_ptr(),
                self.errored.as_mut_ptr(),
                &mut tv,
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
            warn!("select failed: {}", err);
            return Err(err);
        }

        self.cursor = 0;
        match self.next_pending() {
            Some(event) => {
                self.stats.events_yielded += 1;
                Ok(Wait::Ready(event))
            }
            // select reported ret > 0, so a bit is always found.
            None => {
                self.stats.timeouts += 1;
                Ok(Wait::Timeout)
            }
        }
    }

    fn name(&self) -> &'static str {
        "select"
    }

    fn registered(&self) -> usize {
        self.registered
    }

    fn stats(&self) -> MuxStats {
        self.stats
    }
}

impl fmt::Display for SelectMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "multiplexer<select> ({} registered)", self.registered)
    }
}

impl fmt::Debug for SelectMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectMux")
            .field("registered", &self.registered)
            .field("ceiling", &FD_SETSIZE)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_set_basics() {
        let mut set = DescriptorSet::new();
        assert!(!set.contains(5));

        set.insert(5);
        set.insert(100);
        assert!(set.contains(5));
        assert!(set.contains(100));
        assert!(!set.contains(6));

        set.remove(5);
        assert!(!set.contains(5));
        assert!(set.contains(100));
    }

    #[test]
    fn test_descriptor_set_copy_semantics() {
        // wait() refreshes the scratch sets by plain assignment.
        let mut interest = DescriptorSet::new();
        interest.insert(7);

        let mut scratch = interest;
        scratch.remove(7);
        assert!(interest.contains(7));
        assert!(!scratch.contains(7));
    }

    #[test]
    fn test_creation() {
        let mux = SelectMux::new().expect("select instance");
        assert_eq!(mux.name(), "select");
        assert_eq!(mux.registered(), 0);
        assert!(mux.queue_fd().is_none());
    }

    #[test]
    fn test_display_identity() {
        let mut mux = SelectMux::new().expect("select instance");
        assert_eq!(mux.to_string(), "multiplexer<select> (0 registered)");
        mux.add(10, Interest::READ).unwrap();
        assert_eq!(mux.to_string(), "multiplexer<select> (1 registered)");
    }

    #[test]
    fn test_ceiling_rejected_before_any_syscall() {
        let mut mux = SelectMux::new().unwrap();
        let err = mux.add(FD_SETSIZE as RawFd, Interest::READ).unwrap_err();
        assert_eq!(err, MuxError::BadDescriptor(FD_SETSIZE as RawFd));
    }
}
