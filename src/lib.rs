//! flockwait: advisory whole-file locking with a waiter for contended acquisitions.
//!
//! ```no_run
//! use flockwait::{LockFile, ProgressWaiter};
//!
//! let lock = LockFile::open("/tmp/build.lock")?;
//! lock.lock_waiter(ProgressWaiter::stderr())?;
//! // ... exclusive work ...
//! lock.unlock()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod file;
pub mod flock;
pub mod progress;
pub mod ui;
pub mod waiter;

pub use error::LockError;
pub use file::{LockFile, LockGuard};
pub use flock::{LockHandle, LockMode, LockOp, LockTarget, lock, lock_shared, perform_lock, unlock};
pub use progress::ProgressWaiter;
pub use waiter::{
    Cancellation, Canceller, Waiter, cancellation, lock_shared_waiter, lock_wait, lock_waiter,
    no_waiter,
};
