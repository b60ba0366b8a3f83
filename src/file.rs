//! Lock file handle and scoped guards.
//!
//! A [`LockFile`] pairs an open file with the path it was opened from. The
//! lock belongs to the open file description: dropping the `LockFile`
//! closes it and the kernel releases whatever it held. Two `LockFile`s
//! opened on the same path contend with each other even inside one process.

use crate::error::LockError;
use crate::flock::{self, LockHandle, LockMode, LockOp, LockTarget};
use crate::waiter::{self, Waiter};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// An open file that advisory locks are taken on.
#[derive(Debug)]
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Open `path` for locking, creating it if missing. Contents are left alone.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::from_file(file, path))
    }

    /// Open an existing `path` read-only for locking.
    pub fn open_existing(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self::from_file(file, path))
    }

    /// Wrap an already open file. `path` is only used for display.
    pub fn from_file(file: File, path: impl Into<PathBuf>) -> Self {
        Self {
            file,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive lock, blocking until it is granted.
    pub fn lock(&self) -> Result<(), LockError> {
        flock::lock(self)
    }

    /// Take a shared lock, blocking until it is granted.
    pub fn lock_shared(&self) -> Result<(), LockError> {
        flock::lock_shared(self)
    }

    /// Release whichever lock is held.
    pub fn unlock(&self) -> Result<(), LockError> {
        flock::unlock(self)
    }

    /// Take the exclusive lock, running `waiter` while another holder blocks us.
    pub fn lock_waiter<W: Waiter>(&self, waiter: W) -> Result<(), LockError> {
        waiter::lock_waiter(self, waiter)
    }

    /// Take a shared lock, running `waiter` while an exclusive holder blocks us.
    pub fn lock_shared_waiter<W: Waiter>(&self, waiter: W) -> Result<(), LockError> {
        waiter::lock_shared_waiter(self, waiter)
    }

    /// Take `mode` through the waiter path and return a guard that unlocks on drop.
    ///
    /// `LockMode::Unlock` is not something that can be held and fails with
    /// [`LockError::InvalidOperation`].
    pub fn acquire<W: Waiter>(&self, mode: LockMode, waiter: W) -> Result<LockGuard<'_>, LockError> {
        match mode {
            LockMode::Exclusive => self.lock_waiter(waiter)?,
            LockMode::Shared => self.lock_shared_waiter(waiter)?,
            LockMode::Unlock => return Err(LockError::InvalidOperation),
        }
        Ok(LockGuard { file: self, mode })
    }

    /// Take `mode` only if it is free right now.
    pub fn try_acquire(&self, mode: LockMode) -> Result<LockGuard<'_>, LockError> {
        if mode == LockMode::Unlock {
            return Err(LockError::InvalidOperation);
        }
        flock::perform_lock(self, LockOp::nonblocking(mode))?;
        Ok(LockGuard { file: self, mode })
    }
}

impl LockHandle for LockFile {
    fn flock(&self, op: LockOp) -> io::Result<()> {
        flock::flock_file(&self.file, op)
    }

    fn target(&self) -> LockTarget {
        LockTarget::new(&self.path)
    }
}

/// A held lock; released when dropped.
#[derive(Debug)]
pub struct LockGuard<'a> {
    file: &'a LockFile,
    mode: LockMode,
}

impl LockGuard<'_> {
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Release now and report the outcome instead of logging it.
    pub fn release(self) -> Result<(), LockError> {
        let file = self.file;
        std::mem::forget(self);
        file.unlock()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!(path = %self.file.path().display(), error = %err, "failed to release lock");
        }
    }
}
