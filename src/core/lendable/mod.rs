//! Lendable references: single-slot cells whose value is borrowed and returned.
//!
//! A value is *taken* (a loan is recorded), used, and then either *taken back*
//! (it stays in the slot for the next taker) or *taken back and reset* (the
//! slot is emptied and a producer may install a new value). `put` replaces the
//! value once no loans are outstanding.
//!
//! Two lending modes exist:
//!
//! - [`StrictLendableReference`]: at most one loan at a time.
//! - [`RelaxedLendableReference`]: any number of concurrent loans of the
//!   same value.
//!
//! [`WaitpointLendableReference`] puts a [`Waitpoint`](crate::core::Waitpoint)
//! in front of `take`.

mod gated;
mod slot;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::SyncError;

pub use gated::WaitpointLendableReference;
pub use slot::{RelaxedLendableReference, StrictLendableReference};

/// How many loans of the current value may be outstanding at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LendingMode {
    /// One loan at a time.
    #[default]
    Strict,
    /// Any number of loans of the same value.
    Relaxed,
}

/// A single-slot cell with loan accounting.
pub trait LendableReference<E>: Send + Sync {
    /// Borrow the current value, blocking until one is present (and, in
    /// strict mode, until no other loan is outstanding).
    ///
    /// # Errors
    ///
    /// [`SyncError::Interrupted`] if interrupted; no loan is recorded.
    fn take(&self) -> Result<E, SyncError>;

    /// Bounded [`take`](Self::take).
    ///
    /// # Errors
    ///
    /// [`SyncError::Timeout`] or [`SyncError::Interrupted`]; no loan is recorded.
    fn try_take(&self, timeout: Duration) -> Result<E, SyncError>;

    /// Return a loan. The value stays available for the next taker.
    ///
    /// # Errors
    ///
    /// [`SyncError::IllegalState`] if no loan is outstanding.
    fn takeback(&self, value: E) -> Result<(), SyncError>;

    /// Return a loan and clear the slot, unblocking waiting producers.
    ///
    /// # Errors
    ///
    /// [`SyncError::IllegalState`] if no loan is outstanding.
    fn takeback_and_reset(&self, value: E) -> Result<(), SyncError>;

    /// Install `value` once no loans are outstanding, returning the value it replaced.
    ///
    /// # Errors
    ///
    /// [`SyncError::Interrupted`] if interrupted; the slot is unchanged.
    fn put(&self, value: E) -> Result<Option<E>, SyncError>;

    /// Bounded [`put`](Self::put).
    ///
    /// # Errors
    ///
    /// [`SyncError::Timeout`] or [`SyncError::Interrupted`]; the slot is unchanged.
    fn try_put(&self, value: E, timeout: Duration) -> Result<Option<E>, SyncError>;

    /// Current value without taking a loan.
    fn peek(&self) -> Option<E>;

    /// Number of outstanding loans.
    fn loans(&self) -> usize;
}

/// Create an empty lendable reference for `mode`.
#[must_use]
pub fn lendable_reference<E>(mode: LendingMode) -> Arc<dyn LendableReference<E>>
where
    E: Clone + Send + 'static,
{
    match mode {
        LendingMode::Strict => Arc::new(StrictLendableReference::new()),
        LendingMode::Relaxed => Arc::new(RelaxedLendableReference::new()),
    }
}
