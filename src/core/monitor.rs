//! Mutex + condition variable pair with interruptible, deadline-aware waits.
//!
//! All blocking primitives in this crate keep their state in a `Monitor`.
//! Waits register the monitor with the calling thread's
//! [`InterruptHandle`](crate::core::InterruptHandle), so an interrupt wakes the
//! waiter without polling.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::core::interrupt::{InterruptHandle, Wake};
use crate::core::SyncError;

pub(crate) struct Monitor<S> {
    state: Mutex<S>,
    changed: Condvar,
}

impl<S> Monitor<S> {
    pub(crate) fn new(state: S) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            changed: Condvar::new(),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, S> {
        self.state.lock()
    }

    /// Wake every waiter. Callers normally hold the guard while calling this.
    pub(crate) fn notify_all(&self) {
        self.changed.notify_all();
    }
}

impl<S: Send + 'static> Monitor<S> {
    /// Block while `blocked` holds, up to `deadline` if given.
    ///
    /// The interrupt flag is checked before the condition, so a thread that is
    /// already interrupted fails even if it would not have had to wait.
    pub(crate) fn await_while<F>(
        self: &Arc<Self>,
        guard: &mut MutexGuard<'_, S>,
        deadline: Option<Instant>,
        mut blocked: F,
    ) -> Result<(), SyncError>
    where
        F: FnMut(&mut S) -> bool,
    {
        self.await_ready(guard, deadline, |state| (!blocked(state)).then_some(()))
    }

    /// Block until `ready` yields a value, up to `deadline` if given.
    ///
    /// `ready` runs under the lock and may update the state when it yields, so
    /// checking and claiming happen in one step.
    pub(crate) fn await_ready<T, F>(
        self: &Arc<Self>,
        guard: &mut MutexGuard<'_, S>,
        deadline: Option<Instant>,
        mut ready: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut(&mut S) -> Option<T>,
    {
        let interrupt = InterruptHandle::current();
        let _parked = interrupt.park_on(Arc::clone(self) as Arc<dyn Wake>);
        loop {
            if interrupt.take_raised() {
                return Err(SyncError::Interrupted);
            }
            if let Some(value) = ready(guard) {
                return Ok(value);
            }
            match deadline {
                None => self.changed.wait(guard),
                Some(deadline) => {
                    if self.changed.wait_until(guard, deadline).timed_out() {
                        if interrupt.take_raised() {
                            return Err(SyncError::Interrupted);
                        }
                        return ready(guard).ok_or(SyncError::Timeout);
                    }
                }
            }
        }
    }

    /// Park once until `until`, a notification, or an interrupt.
    ///
    /// Returns `Ok` for both wake-ups and expiry; callers re-check their state.
    pub(crate) fn park_until(
        self: &Arc<Self>,
        guard: &mut MutexGuard<'_, S>,
        until: Instant,
    ) -> Result<(), SyncError> {
        let interrupt = InterruptHandle::current();
        let _parked = interrupt.park_on(Arc::clone(self) as Arc<dyn Wake>);
        if interrupt.take_raised() {
            return Err(SyncError::Interrupted);
        }
        self.changed.wait_until(guard, until);
        if interrupt.take_raised() {
            return Err(SyncError::Interrupted);
        }
        Ok(())
    }
}

impl<S: Send> Wake for Monitor<S> {
    fn wake(&self) {
        // Taking the lock orders this notify after the waiter's flag check.
        let _guard = self.state.lock();
        self.changed.notify_all();
    }
}

/// Deadline for a bounded wait, `None` if it would overflow.
pub(crate) fn deadline_after(timeout: std::time::Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}
