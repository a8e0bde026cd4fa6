//! Error types for the concurrency primitives.

use thiserror::Error;

/// Errors produced by waitpoints, lendable references, pools and resequencers.
///
/// Every variant except [`SyncError::Spawn`] maps onto a caller-visible
/// condition that leaves the primitive exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Operation is not allowed in the current lifecycle state.
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// Malformed input supplied by the caller.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    /// A bounded wait did not complete in time.
    #[error("timed out")]
    Timeout,
    /// The waiting thread was interrupted.
    #[error("interrupted")]
    Interrupted,
    /// A bounded buffer is full.
    #[error("capacity exceeded: {0} items buffered")]
    CapacityExceeded(usize),
    /// An index at or before the emitted watermark (or already buffered) arrived again.
    #[error("duplicate sequence index {index} (last returned: {watermark:?})")]
    DuplicateSequence {
        /// Index that was received.
        index: u64,
        /// Highest index emitted so far, if any.
        watermark: Option<u64>,
    },
    /// Work was refused because the service does not accept it in its current state.
    #[error("rejected: {0}")]
    Rejected(String),
    /// An OS thread could not be created.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}

impl SyncError {
    /// Returns true for the two "wait did not finish" outcomes.
    #[must_use]
    pub const fn is_wait_aborted(&self) -> bool {
        matches!(self, Self::Timeout | Self::Interrupted)
    }
}

/// Application-facing result used for units of work, which may fail with any error.
pub type AppResult<T> = Result<T, anyhow::Error>;
