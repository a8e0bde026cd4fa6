//! Lendable reference guarded by a waitpoint.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{SyncError, Waitpoint};

use super::LendableReference;

/// Decorator that makes `take` pass a [`Waitpoint`] first.
///
/// Only consumption is gated: returning a loan and producing values always
/// go straight to the target, so closing the gate stops new entries without
/// trapping loans already handed out.
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use prometheus_concurrency::core::{
///     CloseableWaitpoint, LendableReference, StrictLendableReference, SyncError,
///     WaitpointLendableReference,
/// };
///
/// let gate = Arc::new(CloseableWaitpoint::new(false));
/// let reference: WaitpointLendableReference<i32, StrictLendableReference<i32>> =
///     WaitpointLendableReference::new(
///         Arc::new(StrictLendableReference::with_value(1)),
///         gate.clone(),
///     );
/// assert_eq!(reference.try_take(Duration::from_millis(5)), Err(SyncError::Timeout));
/// gate.open();
/// assert_eq!(reference.take(), Ok(1));
/// ```
pub struct WaitpointLendableReference<E, R: ?Sized = dyn LendableReference<E>> {
    target: Arc<R>,
    waitpoint: Arc<dyn Waitpoint>,
    _value: PhantomData<fn() -> E>,
}

impl<E, R> WaitpointLendableReference<E, R>
where
    R: LendableReference<E> + ?Sized,
{
    /// Wrap `target` so every take passes `waitpoint` first.
    pub fn new(target: Arc<R>, waitpoint: Arc<dyn Waitpoint>) -> Self {
        Self {
            target,
            waitpoint,
            _value: PhantomData,
        }
    }

    /// The gate in front of `take`.
    #[must_use]
    pub fn waitpoint(&self) -> &Arc<dyn Waitpoint> {
        &self.waitpoint
    }

    /// The wrapped reference.
    #[must_use]
    pub fn target(&self) -> &Arc<R> {
        &self.target
    }
}

impl<E, R> LendableReference<E> for WaitpointLendableReference<E, R>
where
    R: LendableReference<E> + ?Sized,
{
    fn take(&self) -> Result<E, SyncError> {
        self.waitpoint.pass()?;
        self.target.take()
    }

    fn try_take(&self, timeout: Duration) -> Result<E, SyncError> {
        let remaining = self.waitpoint.try_pass(timeout)?;
        self.target.try_take(remaining)
    }

    fn takeback(&self, value: E) -> Result<(), SyncError> {
        self.target.takeback(value)
    }

    fn takeback_and_reset(&self, value: E) -> Result<(), SyncError> {
        self.target.takeback_and_reset(value)
    }

    fn put(&self, value: E) -> Result<Option<E>, SyncError> {
        self.target.put(value)
    }

    fn try_put(&self, value: E, timeout: Duration) -> Result<Option<E>, SyncError> {
        self.target.try_put(value, timeout)
    }

    fn peek(&self) -> Option<E> {
        self.target.peek()
    }

    fn loans(&self) -> usize {
        self.target.loans()
    }
}
