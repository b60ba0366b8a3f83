//! The advisory lock primitive.
//!
//! [`perform_lock`] issues one `flock(2)`-style call per attempt, retries
//! while the call is interrupted by a signal, and classifies everything
//! else into [`LockError`].

use crate::error::LockError;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use strum::AsRefStr;

/// Which lock to take or drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum LockMode {
    /// At most one holder across all processes.
    Exclusive,
    /// Any number of holders, excluded by an exclusive holder.
    Shared,
    /// Release whatever this handle holds.
    Unlock,
}

/// A lock mode together with the non-blocking flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockOp {
    pub mode: LockMode,
    pub nonblocking: bool,
}

impl LockOp {
    pub const fn blocking(mode: LockMode) -> Self {
        Self {
            mode,
            nonblocking: false,
        }
    }

    pub const fn nonblocking(mode: LockMode) -> Self {
        Self {
            mode,
            nonblocking: true,
        }
    }

    /// The non-blocking variant of this operation.
    pub const fn probe(self) -> Self {
        Self::nonblocking(self.mode)
    }
}

impl fmt::Display for LockOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nonblocking {
            write!(f, "{} (non-blocking)", self.mode.as_ref())
        } else {
            f.write_str(self.mode.as_ref())
        }
    }
}

/// Read-only description of a lock handle, handed to waiters for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTarget {
    path: Arc<Path>,
}

impl LockTarget {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Arc::from(path.as_ref()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// An open resource that advisory lock calls can be issued against.
///
/// Implementors perform exactly one underlying call per `flock` and report
/// its raw outcome; retrying and classification happen in [`perform_lock`].
pub trait LockHandle {
    fn flock(&self, op: LockOp) -> io::Result<()>;

    fn target(&self) -> LockTarget;
}

/// One underlying call against a plain file, through `fs2`.
///
/// Calls are spelled through the trait so newer inherent `File` locking
/// methods never shadow them.
pub(crate) fn flock_file(file: &std::fs::File, op: LockOp) -> io::Result<()> {
    use fs2::FileExt;

    match (op.mode, op.nonblocking) {
        (LockMode::Exclusive, false) => FileExt::lock_exclusive(file),
        (LockMode::Exclusive, true) => FileExt::try_lock_exclusive(file),
        (LockMode::Shared, false) => FileExt::lock_shared(file),
        (LockMode::Shared, true) => FileExt::try_lock_shared(file),
        (LockMode::Unlock, _) => FileExt::unlock(file),
    }
}

/// Apply `op` to `handle`, retrying for as long as the call is interrupted.
pub fn perform_lock<H>(handle: &H, op: LockOp) -> Result<(), LockError>
where
    H: LockHandle + ?Sized,
{
    loop {
        match handle.flock(op) {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                tracing::trace!(op = %op, "lock call interrupted, retrying");
                continue;
            }
            Err(err) => return Err(LockError::classify(err, op.nonblocking)),
        }
    }
}

/// Take the exclusive lock, blocking until it is granted.
pub fn lock<H: LockHandle + ?Sized>(handle: &H) -> Result<(), LockError> {
    perform_lock(handle, LockOp::blocking(LockMode::Exclusive))
}

/// Take a shared lock, blocking until it is granted.
pub fn lock_shared<H: LockHandle + ?Sized>(handle: &H) -> Result<(), LockError> {
    perform_lock(handle, LockOp::blocking(LockMode::Shared))
}

/// Release whichever lock this handle holds.
pub fn unlock<H: LockHandle + ?Sized>(handle: &H) -> Result<(), LockError> {
    perform_lock(handle, LockOp::blocking(LockMode::Unlock))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted handle for exercising the protocol without a kernel.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub(crate) struct ScriptedHandle {
        outcomes: Mutex<VecDeque<io::Result<()>>>,
        calls: Mutex<Vec<LockOp>>,
    }

    impl ScriptedHandle {
        pub(crate) fn new(outcomes: Vec<io::Result<()>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<LockOp> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl LockHandle for ScriptedHandle {
        fn flock(&self, op: LockOp) -> io::Result<()> {
            self.calls.lock().unwrap().push(op);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unscripted lock call: {op}"))
        }

        fn target(&self) -> LockTarget {
            LockTarget::new("scripted.lock")
        }
    }

    pub(crate) fn interrupted() -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Interrupted))
    }

    pub(crate) fn contended() -> io::Result<()> {
        Err(fs2::lock_contended_error())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn interruptions_are_retried_until_success() {
        let handle = ScriptedHandle::new(vec![interrupted(), interrupted(), interrupted(), Ok(())]);

        lock(&handle).unwrap();

        assert_eq!(handle.calls().len(), 4);
        assert!(
            handle
                .calls()
                .iter()
                .all(|op| *op == LockOp::blocking(LockMode::Exclusive))
        );
    }

    #[test]
    fn interruptions_are_retried_until_real_error() {
        let handle = ScriptedHandle::new(vec![
            interrupted(),
            interrupted(),
            Err(io::Error::from_raw_os_error(libc::ENOLCK)),
        ]);

        let err = lock_shared(&handle).unwrap_err();

        assert!(matches!(err, LockError::OutOfLockResources));
        assert_eq!(handle.calls().len(), 3);
    }

    #[test]
    fn nonblocking_contention_is_would_block() {
        let handle = ScriptedHandle::new(vec![contended()]);

        let err = perform_lock(&handle, LockOp::nonblocking(LockMode::Exclusive)).unwrap_err();

        assert!(err.is_would_block());
    }

    #[test]
    fn blocking_contention_is_never_would_block() {
        let handle = ScriptedHandle::new(vec![contended()]);

        let err = lock(&handle).unwrap_err();

        assert!(matches!(err, LockError::Other(_)));
    }

    #[test]
    fn bad_descriptor_is_not_retried() {
        let handle = ScriptedHandle::new(vec![Err(io::Error::from_raw_os_error(libc::EBADF))]);

        let err = unlock(&handle).unwrap_err();

        assert!(matches!(err, LockError::BadDescriptor));
        assert_eq!(handle.calls(), vec![LockOp::blocking(LockMode::Unlock)]);
    }

    #[test]
    fn probe_keeps_mode() {
        let op = LockOp::blocking(LockMode::Shared).probe();
        assert_eq!(op, LockOp::nonblocking(LockMode::Shared));
        assert_eq!(op.to_string(), "shared (non-blocking)");
    }
}
