//! Waitpoints: gates a thread must pass before it proceeds.
//!
//! - [`CloseableWaitpoint`] opens and closes on command.
//! - [`ThrottlingWaitpoint`] limits the passage rate with a token bucket.
//! - [`AllOfWaitpoint`] requires passing several waitpoints in order.
//!
//! Waitpoints are most useful in front of a lendable reference (see
//! [`WaitpointLendableReference`](crate::core::WaitpointLendableReference)),
//! where closing the gate pauses a repeater without touching its pool.

mod closeable;
mod throttling;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::SyncError;

pub use closeable::CloseableWaitpoint;
pub use throttling::ThrottlingWaitpoint;

/// A gate that callers pass before entering a guarded section.
pub trait Waitpoint: Send + Sync {
    /// Block until passage is allowed.
    ///
    /// # Errors
    ///
    /// [`SyncError::Interrupted`] if the calling thread is interrupted.
    fn pass(&self) -> Result<(), SyncError>;

    /// Block at most `timeout` until passage is allowed.
    ///
    /// Returns the unused part of `timeout`, so the caller can spend it on a
    /// subsequent bounded wait.
    ///
    /// # Errors
    ///
    /// [`SyncError::Timeout`] if the gate did not allow passage in time,
    /// [`SyncError::Interrupted`] if the calling thread is interrupted.
    fn try_pass(&self, timeout: Duration) -> Result<Duration, SyncError>;

    /// Non-blocking snapshot; may be stale by the time the caller acts on it.
    fn is_passable(&self) -> bool;
}

/// Passes every inner waitpoint in order.
///
/// A bounded pass spends one budget across the whole chain.
pub struct AllOfWaitpoint {
    waitpoints: Vec<Arc<dyn Waitpoint>>,
}

impl AllOfWaitpoint {
    /// Create a composite from waitpoints passed in the given order.
    #[must_use]
    pub fn new(waitpoints: Vec<Arc<dyn Waitpoint>>) -> Self {
        Self { waitpoints }
    }

    /// Number of chained waitpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waitpoints.len()
    }

    /// True if there is nothing to pass.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waitpoints.is_empty()
    }
}

impl Waitpoint for AllOfWaitpoint {
    fn pass(&self) -> Result<(), SyncError> {
        for waitpoint in &self.waitpoints {
            waitpoint.pass()?;
        }
        Ok(())
    }

    fn try_pass(&self, timeout: Duration) -> Result<Duration, SyncError> {
        let mut remaining = timeout;
        for waitpoint in &self.waitpoints {
            remaining = waitpoint.try_pass(remaining)?;
        }
        Ok(remaining)
    }

    fn is_passable(&self) -> bool {
        self.waitpoints.iter().all(|waitpoint| waitpoint.is_passable())
    }
}

/// Time left until `deadline`, zero if it already passed.
pub(crate) fn remaining_until(deadline: Option<Instant>, timeout: Duration) -> Duration {
    deadline.map_or(timeout, |deadline| {
        deadline.saturating_duration_since(Instant::now())
    })
}
