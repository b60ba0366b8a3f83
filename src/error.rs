//! Lock error taxonomy.
//!
//! Every lock call ends in `Ok(())` or exactly one of these variants. Signal
//! interruption is not represented: it is retried inside
//! [`perform_lock`](crate::flock::perform_lock) and never reaches callers.

use std::io;
use thiserror::Error;

/// Failure of a single advisory lock operation.
#[derive(Debug, Error)]
pub enum LockError {
    /// The handle does not refer to an open file descriptor.
    #[error("flock: bad file descriptor")]
    BadDescriptor,

    /// The requested operation is not valid for this handle.
    #[error("flock: invalid operation provided")]
    InvalidOperation,

    /// The kernel ran out of memory for lock records.
    #[error("flock: kernel is out of memory for locks")]
    OutOfLockResources,

    /// A non-blocking request could not be granted without waiting.
    #[error("flock: operation would block")]
    WouldBlock,

    /// Any other failure of the underlying call. The cause is the `source()`.
    #[error("flock: lock call failed")]
    Other(#[source] io::Error),
}

impl LockError {
    /// Classify the error returned by one lock call.
    ///
    /// `nonblocking` is whether the call carried the non-blocking flag. A
    /// contended result is only `WouldBlock` for non-blocking calls; from a
    /// blocking call it is unexpected and kept as `Other`.
    ///
    /// Interrupted calls must be filtered out by the caller before this.
    pub(crate) fn classify(err: io::Error, nonblocking: bool) -> Self {
        if is_contended(&err) {
            return if nonblocking {
                Self::WouldBlock
            } else {
                Self::Other(err)
            };
        }

        match err.raw_os_error() {
            #[cfg(unix)]
            Some(libc::EBADF) => Self::BadDescriptor,
            #[cfg(unix)]
            Some(libc::EINVAL) => Self::InvalidOperation,
            #[cfg(unix)]
            Some(libc::ENOLCK) => Self::OutOfLockResources,
            _ => Self::Other(err),
        }
    }

    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }
}

fn is_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    match (err.raw_os_error(), fs2::lock_contended_error().raw_os_error()) {
        (Some(code), Some(contended)) => code == contended,
        _ => false,
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    fn os(code: i32) -> io::Error {
        io::Error::from_raw_os_error(code)
    }

    #[test]
    fn known_errnos_map_to_variants() {
        assert!(matches!(
            LockError::classify(os(libc::EBADF), false),
            LockError::BadDescriptor
        ));
        assert!(matches!(
            LockError::classify(os(libc::EINVAL), true),
            LockError::InvalidOperation
        ));
        assert!(matches!(
            LockError::classify(os(libc::ENOLCK), false),
            LockError::OutOfLockResources
        ));
    }

    #[test]
    fn contended_is_would_block_only_when_nonblocking() {
        assert!(LockError::classify(os(libc::EWOULDBLOCK), true).is_would_block());

        match LockError::classify(os(libc::EWOULDBLOCK), false) {
            LockError::Other(err) => assert_eq!(err.raw_os_error(), Some(libc::EWOULDBLOCK)),
            other => panic!("expected Other, got {other:?}"),
        }
    }

    #[test]
    fn unknown_errno_keeps_cause() {
        match LockError::classify(os(libc::EIO), false) {
            LockError::Other(err) => assert_eq!(err.raw_os_error(), Some(libc::EIO)),
            other => panic!("expected Other, got {other:?}"),
        }
    }

    #[test]
    fn other_exposes_source() {
        use std::error::Error as _;
        let err = LockError::classify(os(libc::EIO), false);
        assert!(err.source().is_some());
        assert!(LockError::WouldBlock.source().is_none());
    }

    #[test]
    fn other_cause_is_printed_once_in_chain() {
        let err = anyhow::Error::new(LockError::classify(os(libc::EIO), false))
            .context("Failed to acquire exclusive lock: x.lock");
        let cause = os(libc::EIO).to_string();

        let rendered = format!("{err:#}");
        assert_eq!(
            rendered,
            format!("Failed to acquire exclusive lock: x.lock: flock: lock call failed: {cause}")
        );
        assert_eq!(rendered.matches(&cause).count(), 1);
    }
}
