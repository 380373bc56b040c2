use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use tracing::{debug, warn};

use crate::error::{LockError, LockResult};
use crate::guard::LockGuard;
use crate::options::LockOptions;

/// A named, cross-process mutual exclusion built on the storage service.
pub trait LockStrategy: Send + Sync + fmt::Debug {
    /// Block until `name` is held.
    ///
    /// Fails with `Timeout` once the configured deadline or attempt budget
    /// runs out; the waiter's marker is removed first.
    fn acquire(&self, name: &str) -> LockResult<LockGuard>;
}

impl<L: LockStrategy + ?Sized> LockStrategy for Arc<L> {
    fn acquire(&self, name: &str) -> LockResult<LockGuard> {
        (**self).acquire(name)
    }
}

/// Run `f` while holding `name`, releasing the lock however `f` ends.
///
/// An error from `f` takes precedence over a release error.
pub fn critical_section<L, T, E, F>(lock: &L, name: &str, f: F) -> Result<T, E>
where
    L: LockStrategy + ?Sized,
    E: From<LockError>,
    F: FnOnce() -> Result<T, E>,
{
    let guard = lock.acquire(name)?;
    let result = f();
    match guard.release() {
        Ok(()) => result,
        Err(e) if result.is_err() => {
            warn!(lock = name, error = %e, "release failed after critical section error");
            result
        }
        Err(e) => Err(e.into()),
    }
}

/// Acquire `name` on a dedicated thread and deliver the outcome on the
/// returned channel.
///
/// If the receiver is gone by the time the lock is held, the guard is
/// dropped and the lock released.
pub fn spawn_acquire<L>(lock: Arc<L>, name: impl Into<String>) -> Receiver<LockResult<LockGuard>>
where
    L: LockStrategy + ?Sized + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    let name = name.into();
    std::thread::spawn(move || {
        let outcome = lock.acquire(&name);
        if tx.send(outcome).is_err() {
            debug!(lock = %name, "acquisition abandoned by caller");
        }
    });
    rx
}

pub(crate) fn validate_lock_name(name: &str) -> LockResult<()> {
    if name.is_empty() || name.contains('/') || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(LockError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Poll `is_first` until it reports our marker at the head of the queue.
///
/// Returns the number of polls taken. Listing errors and exhaustion are
/// returned to the caller, which owns marker cleanup.
pub(crate) fn wait_for_turn<F>(name: &str, options: &LockOptions, mut is_first: F) -> LockResult<u32>
where
    F: FnMut() -> LockResult<bool>,
{
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if is_first()? {
            return Ok(attempts);
        }
        if options.exhausted(attempts, started) {
            return Err(LockError::Timeout {
                name: name.to_string(),
                attempts,
            });
        }
        debug!(lock = name, attempts, "lock busy, waiting");
        options.pause(started);
    }
}
