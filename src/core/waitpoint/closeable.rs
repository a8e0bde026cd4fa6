//! Open/closed gate.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::monitor::{deadline_after, Monitor};
use crate::core::SyncError;

use super::{remaining_until, Waitpoint};

/// A waitpoint that is either open (everyone passes) or closed (everyone waits).
///
/// Closing never recalls threads that already passed; opening wakes every
/// blocked passer.
///
/// ```
/// use prometheus_concurrency::core::{CloseableWaitpoint, Waitpoint};
///
/// let gate = CloseableWaitpoint::new(false);
/// assert!(!gate.is_passable());
/// gate.open();
/// gate.pass().unwrap();
/// ```
pub struct CloseableWaitpoint {
    monitor: Arc<Monitor<bool>>,
}

impl CloseableWaitpoint {
    /// Create a gate in the given state.
    #[must_use]
    pub fn new(open: bool) -> Self {
        Self {
            monitor: Monitor::new(open),
        }
    }

    /// Open the gate and wake every blocked passer.
    pub fn open(&self) {
        let mut open = self.monitor.lock();
        if !*open {
            *open = true;
            self.monitor.notify_all();
            debug!("waitpoint opened");
        }
    }

    /// Close the gate. Does not block and does not affect threads already through.
    pub fn close(&self) {
        let mut open = self.monitor.lock();
        if *open {
            *open = false;
            debug!("waitpoint closed");
        }
    }

    /// Open if `open` is true, close otherwise.
    pub fn set_open(&self, open: bool) {
        if open {
            self.open();
        } else {
            self.close();
        }
    }

    /// Whether the gate is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.monitor.lock()
    }
}

impl fmt::Debug for CloseableWaitpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseableWaitpoint")
            .field("open", &self.is_open())
            .finish()
    }
}

impl Default for CloseableWaitpoint {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Waitpoint for CloseableWaitpoint {
    fn pass(&self) -> Result<(), SyncError> {
        let mut open = self.monitor.lock();
        self.monitor.await_while(&mut open, None, |open| !*open)
    }

    fn try_pass(&self, timeout: Duration) -> Result<Duration, SyncError> {
        let deadline = deadline_after(timeout);
        let mut open = self.monitor.lock();
        self.monitor.await_while(&mut open, deadline, |open| !*open)?;
        Ok(remaining_until(deadline, timeout))
    }

    fn is_passable(&self) -> bool {
        self.is_open()
    }
}
