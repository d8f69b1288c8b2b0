/*!
 * Error Types
 * Structured multiplexer errors carrying platform errno values
 */

use nix::errno::Errno;
use std::io;
use std::os::unix::io::RawFd;
use thiserror::Error;

/// Named errno constants for symbolic comparison by callers.
pub const EBADF: i32 = libc::EBADF;
pub const EEXIST: i32 = libc::EEXIST;
pub const ENOENT: i32 = libc::ENOENT;
pub const EMFILE: i32 = libc::EMFILE;

/// Multiplexer operation errors.
///
/// Usage errors (bad descriptor, duplicate or phantom registration,
/// capacity exhaustion) map to the conventional errno values; `Os`
/// carries whatever the kernel reported. No failure path panics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    /// Negative or otherwise unusable descriptor (EBADF)
    #[error("bad descriptor: {0}")]
    BadDescriptor(RawFd),

    /// Descriptor is already watched by this instance (EEXIST)
    #[error("descriptor {0} is already registered")]
    AlreadyRegistered(RawFd),

    /// Descriptor is not watched by this instance (ENOENT)
    #[error("descriptor {0} is not registered")]
    NotRegistered(RawFd),

    /// Fixed backend capacity reached (EMFILE)
    #[error("registration capacity exhausted: {count}/{capacity}")]
    CapacityExhausted { count: usize, capacity: usize },

    /// Failure reported by the OS, during construction or a blocking poll
    #[error("{message} (errno {code})")]
    Os { code: i32, message: String },
}

impl MuxError {
    /// Capture the calling thread's errno after a failed syscall.
    pub(crate) fn last_os() -> Self {
        let errno = Errno::last();
        Self::Os {
            code: errno as i32,
            message: errno.desc().into(),
        }
    }

    /// Platform error number for this error, so callers can branch on it
    /// programmatically instead of parsing the message.
    pub fn errno(&self) -> i32 {
        match self {
            Self::BadDescriptor(_) => EBADF,
            Self::AlreadyRegistered(_) => EEXIST,
            Self::NotRegistered(_) => ENOENT,
            Self::CapacityExhausted { .. } => EMFILE,
            Self::Os { code, .. } => *code,
        }
    }
}

impl From<MuxError> for io::Error {
    fn from(err: MuxError) -> Self {
        io::Error::from_raw_os_error(err.errno())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(MuxError::BadDescriptor(-1).errno(), EBADF);
        assert_eq!(MuxError::AlreadyRegistered(3).errno(), EEXIST);
        assert_eq!(MuxError::NotRegistered(3).errno(), ENOENT);
        assert_eq!(
            MuxError::CapacityExhausted {
                count: 4,
                capacity: 4
            }
            .errno(),
            EMFILE
        );
        assert_eq!(
            MuxError::Os {
                code: libc::EINVAL,
                message: "invalid".into()
            }
            .errno(),
            libc::EINVAL
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: io::Error = MuxError::NotRegistered(7).into();
        assert_eq!(err.raw_os_error(), Some(ENOENT));
    }
}
