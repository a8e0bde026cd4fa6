//! Strict and relaxed lendable references sharing one slot implementation.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::monitor::{deadline_after, Monitor};
use crate::core::SyncError;

use super::{LendableReference, LendingMode};

struct SlotState<E> {
    value: Option<E>,
    loans: usize,
    /// Producers waiting for loans to drain. New loans wait while non-zero,
    /// otherwise overlapping relaxed loans could hold a `put` off forever.
    waiting_puts: usize,
}

struct Slot<E> {
    mode: LendingMode,
    monitor: Arc<Monitor<SlotState<E>>>,
}

impl<E> Slot<E>
where
    E: Clone + Send + 'static,
{
    fn new(mode: LendingMode, value: Option<E>) -> Self {
        Self {
            mode,
            monitor: Monitor::new(SlotState {
                value,
                loans: 0,
                waiting_puts: 0,
            }),
        }
    }

    fn take(&self, deadline: Option<Instant>) -> Result<E, SyncError> {
        let mode = self.mode;
        let mut state = self.monitor.lock();
        self.monitor.await_ready(&mut state, deadline, |state| {
            if state.waiting_puts > 0 || (mode == LendingMode::Strict && state.loans > 0) {
                return None;
            }
            let value = state.value.clone()?;
            state.loans += 1;
            Some(value)
        })
    }

    fn give_back(&self, value: E, reset: bool) -> Result<(), SyncError> {
        let previous = {
            let mut state = self.monitor.lock();
            if state.loans == 0 {
                return Err(SyncError::IllegalState(
                    "takeback without an outstanding loan".into(),
                ));
            }
            state.loans -= 1;
            let previous = if reset { state.value.take() } else { None };
            if reset || state.loans == 0 {
                self.monitor.notify_all();
            }
            previous
        };
        drop(value);
        drop(previous);
        Ok(())
    }

    fn put(&self, value: E, deadline: Option<Instant>) -> Result<Option<E>, SyncError> {
        let mut state = self.monitor.lock();
        state.waiting_puts += 1;
        let drained = self
            .monitor
            .await_while(&mut state, deadline, |state| state.loans > 0);
        state.waiting_puts -= 1;
        // Either way, takers held back by this put may proceed now.
        self.monitor.notify_all();
        drained?;
        Ok(state.value.replace(value))
    }

    fn peek(&self) -> Option<E> {
        self.monitor.lock().value.clone()
    }

    fn loans(&self) -> usize {
        self.monitor.lock().loans
    }
}

impl<E> fmt::Debug for Slot<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.monitor.lock();
        f.debug_struct("LendableReference")
            .field("mode", &self.mode)
            .field("occupied", &state.value.is_some())
            .field("loans", &state.loans)
            .finish()
    }
}

/// Lendable reference that allows one loan at a time.
///
/// ```
/// use prometheus_concurrency::core::{LendableReference, StrictLendableReference};
///
/// let reference = StrictLendableReference::new();
/// assert_eq!(reference.put("job").unwrap(), None);
/// let job = reference.take().unwrap();
/// reference.takeback_and_reset(job).unwrap();
/// assert_eq!(reference.peek(), None);
/// ```
#[derive(Debug)]
pub struct StrictLendableReference<E> {
    slot: Slot<E>,
}

impl<E> StrictLendableReference<E>
where
    E: Clone + Send + 'static,
{
    /// Create an empty reference.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Slot::new(LendingMode::Strict, None),
        }
    }

    /// Create a reference holding `value`.
    #[must_use]
    pub fn with_value(value: E) -> Self {
        Self {
            slot: Slot::new(LendingMode::Strict, Some(value)),
        }
    }
}

impl<E> Default for StrictLendableReference<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> LendableReference<E> for StrictLendableReference<E>
where
    E: Clone + Send + 'static,
{
    fn take(&self) -> Result<E, SyncError> {
        self.slot.take(None)
    }

    fn try_take(&self, timeout: Duration) -> Result<E, SyncError> {
        self.slot.take(deadline_after(timeout))
    }

    fn takeback(&self, value: E) -> Result<(), SyncError> {
        self.slot.give_back(value, false)
    }

    fn takeback_and_reset(&self, value: E) -> Result<(), SyncError> {
        self.slot.give_back(value, true)
    }

    fn put(&self, value: E) -> Result<Option<E>, SyncError> {
        self.slot.put(value, None)
    }

    fn try_put(&self, value: E, timeout: Duration) -> Result<Option<E>, SyncError> {
        self.slot.put(value, deadline_after(timeout))
    }

    fn peek(&self) -> Option<E> {
        self.slot.peek()
    }

    fn loans(&self) -> usize {
        self.slot.loans()
    }
}

/// Lendable reference that lends the current value to any number of takers at once.
///
/// A `put` waits until every loan has been returned.
#[derive(Debug)]
pub struct RelaxedLendableReference<E> {
    slot: Slot<E>,
}

impl<E> RelaxedLendableReference<E>
where
    E: Clone + Send + 'static,
{
    /// Create an empty reference.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Slot::new(LendingMode::Relaxed, None),
        }
    }

    /// Create a reference holding `value`.
    #[must_use]
    pub fn with_value(value: E) -> Self {
        Self {
            slot: Slot::new(LendingMode::Relaxed, Some(value)),
        }
    }
}

impl<E> Default for RelaxedLendableReference<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> LendableReference<E> for RelaxedLendableReference<E>
where
    E: Clone + Send + 'static,
{
    fn take(&self) -> Result<E, SyncError> {
        self.slot.take(None)
    }

    fn try_take(&self, timeout: Duration) -> Result<E, SyncError> {
        self.slot.take(deadline_after(timeout))
    }

    fn takeback(&self, value: E) -> Result<(), SyncError> {
        self.slot.give_back(value, false)
    }

    fn takeback_and_reset(&self, value: E) -> Result<(), SyncError> {
        self.slot.give_back(value, true)
    }

    fn put(&self, value: E) -> Result<Option<E>, SyncError> {
        self.slot.put(value, None)
    }

    fn try_put(&self, value: E, timeout: Duration) -> Result<Option<E>, SyncError> {
        self.slot.put(value, deadline_after(timeout))
    }

    fn peek(&self) -> Option<E> {
        self.slot.peek()
    }

    fn loans(&self) -> usize {
        self.slot.loans()
    }
}
