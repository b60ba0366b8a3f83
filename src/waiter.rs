//! Acquire a lock, running a waiter while the acquisition is contended.
//!
//! The lock is first probed without blocking. Only when the probe reports
//! [`LockError::WouldBlock`] is the waiter started on its own thread; the
//! calling thread then blocks on the lock. Once the blocking call returns,
//! successfully or not, the waiter is told to stop exactly once and the
//! outcome is returned without waiting for the waiter to finish.

use crate::error::LockError;
use crate::flock::{LockHandle, LockMode, LockOp, LockTarget, perform_lock};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

/// Work that runs only while a lock acquisition is blocked.
///
/// The waiter must return soon after `cancel` fires. It only gets a
/// description of the handle and must never lock or unlock anything itself;
/// nothing it does, including panicking, affects the acquisition.
pub trait Waiter: Send + 'static {
    fn wait(self, cancel: Cancellation, target: LockTarget);
}

impl<F> Waiter for F
where
    F: FnOnce(Cancellation, LockTarget) + Send + 'static,
{
    fn wait(self, cancel: Cancellation, target: LockTarget) {
        self(cancel, target)
    }
}

/// Receiving side of the one-shot stop signal.
#[derive(Debug)]
pub struct Cancellation {
    rx: Receiver<()>,
}

/// Sending side of the one-shot stop signal. Consumed by [`cancel`](Self::cancel).
#[derive(Debug)]
pub struct Canceller {
    tx: Sender<()>,
}

/// Create a connected stop signal pair.
pub fn cancellation() -> (Canceller, Cancellation) {
    let (tx, rx) = mpsc::channel();
    (Canceller { tx }, Cancellation { rx })
}

impl Canceller {
    pub fn cancel(self) {
        // The waiter may already be gone (returned early or panicked).
        let _ = self.tx.send(());
    }
}

impl Cancellation {
    /// Whether the stop signal has fired. Never blocks.
    pub fn is_cancelled(&self) -> bool {
        match self.rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => true,
            Err(TryRecvError::Empty) => false,
        }
    }

    /// Sleep for up to `timeout`, waking early on cancellation.
    ///
    /// Returns `true` if cancelled, `false` if the timeout elapsed first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Block until cancelled.
    pub fn wait(&self) {
        let _ = self.rx.recv();
    }
}

/// Probe with `probe`, and on contention run `waiter` while blocking on `block`.
///
/// `probe` should be the non-blocking variant of `block`.
pub fn lock_wait<H, W>(handle: &H, probe: LockOp, block: LockOp, waiter: W) -> Result<(), LockError>
where
    H: LockHandle + ?Sized,
    W: Waiter,
{
    let target = handle.target();
    tracing::debug!(target_path = %target, op = %probe, "probing lock");

    match perform_lock(handle, probe) {
        Ok(()) => {
            tracing::debug!(target_path = %target, "lock acquired without contention");
            return Ok(());
        }
        Err(LockError::WouldBlock) => {}
        Err(err) => {
            tracing::debug!(target_path = %target, error = %err, "lock probe failed");
            return Err(err);
        }
    }

    tracing::debug!(target_path = %target, op = %block, "lock contended, waiting");
    let (canceller, cancel) = cancellation();
    let spawned = thread::Builder::new()
        .name("flock-waiter".to_string())
        .spawn({
            let target = target.clone();
            move || waiter.wait(cancel, target)
        });
    if let Err(err) = spawned {
        tracing::warn!(target_path = %target, error = %err, "failed to start lock waiter");
    }

    let result = perform_lock(handle, block);
    canceller.cancel();

    match &result {
        Ok(()) => tracing::debug!(target_path = %target, "lock acquired after waiting"),
        Err(err) => tracing::debug!(target_path = %target, error = %err, "waiting for lock failed"),
    }
    result
}

/// Take the exclusive lock; if it is held elsewhere, run `waiter` until it is granted.
pub fn lock_waiter<H, W>(handle: &H, waiter: W) -> Result<(), LockError>
where
    H: LockHandle + ?Sized,
    W: Waiter,
{
    let block = LockOp::blocking(LockMode::Exclusive);
    lock_wait(handle, block.probe(), block, waiter)
}

/// Take a shared lock; if an exclusive holder exists, run `waiter` until it is granted.
pub fn lock_shared_waiter<H, W>(handle: &H, waiter: W) -> Result<(), LockError>
where
    H: LockHandle + ?Sized,
    W: Waiter,
{
    let block = LockOp::blocking(LockMode::Shared);
    lock_wait(handle, block.probe(), block, waiter)
}

/// A waiter that does nothing.
pub fn no_waiter(_cancel: Cancellation, _target: LockTarget) {}
