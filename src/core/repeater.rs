//! Repeater service: execute one task over and over on a pool of workers.
//!
//! A producer installs a [`Repeatable`] with [`RepeaterService::repeat`]. Each
//! worker takes it from a lendable reference, runs one step, and returns it:
//! with `takeback` if the step asked to continue, with `takeback_and_reset` if
//! it asked to stop, which empties the slot for the next `repeat`.
//!
//! In [`LendingMode::Strict`] only one worker runs the task at a time; in
//! [`LendingMode::Relaxed`] every idle worker may run it concurrently, so the
//! task must then be safe to execute from several threads at once.
//!
//! ```rust
//! use prometheus_concurrency::config::ThreadPoolConfig;
//! use prometheus_concurrency::core::{repeatable, LendingMode, NoOpExceptionHandler, RepeaterService};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let service = RepeaterService::new(
//!     ThreadPoolConfig::new().with_name("ticks").with_pool_size(2),
//!     LendingMode::Strict,
//!     Arc::new(NoOpExceptionHandler),
//! )
//! .unwrap();
//! service.start().unwrap();
//!
//! let ticks = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&ticks);
//! service
//!     .repeat(repeatable(move || Ok(counter.fetch_add(1, Ordering::SeqCst) < 9)))
//!     .unwrap();
//!
//! while service.current_task().is_some() {
//!     std::thread::sleep(Duration::from_millis(1));
//! }
//! assert_eq!(ticks.load(Ordering::SeqCst), 10);
//! service.shutdown_politely().unwrap();
//! service.await_shutdown().unwrap();
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ThreadPoolConfig;
use crate::core::handler::ExceptionHandler;
use crate::core::{
    lendable_reference, AppResult, LendableReference, LendingMode, SyncError, ThreadPool,
    ThreadPoolState, ThreadPoolStats, Waitpoint, WaitpointLendableReference, WorkerJob,
};

/// A unit of work that reports after each execution whether to run again.
pub trait Repeatable: Send + Sync {
    /// Run one step. `Ok(true)` keeps the task installed, `Ok(false)` removes it.
    ///
    /// # Errors
    ///
    /// Errors go to the service's exception handler; the task stays installed.
    fn execute(&self) -> AppResult<bool>;
}

impl<F> Repeatable for F
where
    F: Fn() -> AppResult<bool> + Send + Sync,
{
    fn execute(&self) -> AppResult<bool> {
        self()
    }
}

/// Shared handle to an installed task.
pub type RepeatableRef = Arc<dyn Repeatable>;

/// Wrap a closure as a [`RepeatableRef`].
pub fn repeatable<F>(step: F) -> RepeatableRef
where
    F: Fn() -> AppResult<bool> + Send + Sync + 'static,
{
    Arc::new(step)
}

/// Pool job: borrow the task, run one step, return it.
pub(crate) struct RepeaterJob {
    slot: Arc<dyn LendableReference<RepeatableRef>>,
}

impl WorkerJob for RepeaterJob {
    type Work = RepeatableRef;

    fn take_work(&self) -> Result<RepeatableRef, SyncError> {
        self.slot.take()
    }

    fn execute_work(&self, task: RepeatableRef) -> AppResult<bool> {
        // A panicking task must not keep its loan, or a strict slot would stay locked.
        match panic::catch_unwind(AssertUnwindSafe(|| task.execute())) {
            Ok(Ok(true)) => self.slot.takeback(task)?,
            Ok(Ok(false)) => {
                self.slot.takeback_and_reset(task)?;
                debug!("repeatable finished, slot cleared");
            }
            Ok(Err(error)) => {
                self.slot.takeback(task)?;
                return Err(error);
            }
            Err(payload) => {
                self.slot.takeback(task)?;
                return Err(anyhow!("repeatable panicked: {}", panic_message(payload.as_ref())));
            }
        }
        Ok(true)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Combined lifecycle of a [`RepeaterService`]: its pool and its task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeaterState {
    /// Lifecycle state of the worker pool.
    pub pool: ThreadPoolState,
    /// A task is installed in the slot.
    pub repeating: bool,
    /// Workers currently holding the task.
    pub loans: usize,
}

impl RepeaterState {
    /// Started with a task installed: steps are being executed.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.pool, ThreadPoolState::Started) && self.repeating
    }
}

/// Runs the installed [`Repeatable`] on a resizable pool until told to stop.
pub struct RepeaterService {
    pool: ThreadPool<RepeaterJob>,
    slot: Arc<dyn LendableReference<RepeatableRef>>,
    lending_mode: LendingMode,
    waitpoint: Option<Arc<dyn Waitpoint>>,
}

impl RepeaterService {
    /// Create an unstarted service with an ungated task slot.
    ///
    /// # Errors
    ///
    /// `SyncError::IllegalArgument` if the pool configuration is invalid.
    pub fn new(
        config: ThreadPoolConfig,
        lending_mode: LendingMode,
        handler: Arc<dyn ExceptionHandler>,
    ) -> Result<Self, SyncError> {
        Self::build(config, lending_mode, None, handler)
    }

    /// Create an unstarted service whose workers pass `waitpoint` before taking the task.
    ///
    /// Closing a closeable waitpoint pauses the service; a throttling one
    /// limits how often the task runs.
    ///
    /// # Errors
    ///
    /// `SyncError::IllegalArgument` if the pool configuration is invalid.
    pub fn with_waitpoint(
        config: ThreadPoolConfig,
        lending_mode: LendingMode,
        waitpoint: Arc<dyn Waitpoint>,
        handler: Arc<dyn ExceptionHandler>,
    ) -> Result<Self, SyncError> {
        Self::build(config, lending_mode, Some(waitpoint), handler)
    }

    fn build(
        config: ThreadPoolConfig,
        lending_mode: LendingMode,
        waitpoint: Option<Arc<dyn Waitpoint>>,
        handler: Arc<dyn ExceptionHandler>,
    ) -> Result<Self, SyncError> {
        let plain = lendable_reference::<RepeatableRef>(lending_mode);
        let slot: Arc<dyn LendableReference<RepeatableRef>> = match &waitpoint {
            Some(gate) => Arc::new(WaitpointLendableReference::new(plain, Arc::clone(gate))),
            None => plain,
        };
        let pool = ThreadPool::new(
            config,
            RepeaterJob {
                slot: Arc::clone(&slot),
            },
            handler,
        )?;
        Ok(Self {
            pool,
            slot,
            lending_mode,
            waitpoint,
        })
    }

    /// Start the workers.
    ///
    /// # Errors
    ///
    /// As [`ThreadPool::start`].
    pub fn start(&self) -> Result<(), SyncError> {
        self.pool.start()?;
        info!(service = %self.pool.name(), mode = ?self.lending_mode, "repeater started");
        Ok(())
    }

    fn ensure_accepting(&self) -> Result<(), SyncError> {
        let state = self.pool.state();
        if state == ThreadPoolState::Started {
            Ok(())
        } else {
            Err(SyncError::Rejected(format!(
                "repeater `{}` does not accept tasks in state {state}",
                self.pool.name()
            )))
        }
    }

    /// Install `task`, waiting until no worker holds the current one.
    /// Returns the task it replaced.
    ///
    /// # Errors
    ///
    /// - `SyncError::Rejected` unless the service is started
    /// - `SyncError::Interrupted` if the calling thread is interrupted
    pub fn repeat(&self, task: RepeatableRef) -> Result<Option<RepeatableRef>, SyncError> {
        self.ensure_accepting()?;
        let previous = self.slot.put(task)?;
        debug!(service = %self.pool.name(), replaced = previous.is_some(), "task installed");
        Ok(previous)
    }

    /// Bounded [`repeat`](Self::repeat).
    ///
    /// # Errors
    ///
    /// As `repeat`, plus `SyncError::Timeout`; the current task is left in place.
    pub fn try_repeat(
        &self,
        task: RepeatableRef,
        timeout: Duration,
    ) -> Result<Option<RepeatableRef>, SyncError> {
        self.ensure_accepting()?;
        let previous = self.slot.try_put(task, timeout)?;
        debug!(service = %self.pool.name(), replaced = previous.is_some(), "task installed");
        Ok(previous)
    }

    /// The installed task, if any.
    #[must_use]
    pub fn current_task(&self) -> Option<RepeatableRef> {
        self.slot.peek()
    }

    /// Lending mode of the task slot.
    #[must_use]
    pub const fn lending_mode(&self) -> LendingMode {
        self.lending_mode
    }

    /// Gate in front of the task slot, if any.
    #[must_use]
    pub fn waitpoint(&self) -> Option<&Arc<dyn Waitpoint>> {
        self.waitpoint.as_ref()
    }

    /// Service name (the pool's name).
    #[must_use]
    pub fn name(&self) -> &str {
        self.pool.name()
    }

    /// Resize the worker pool.
    ///
    /// # Errors
    ///
    /// As [`ThreadPool::set_desired_pool_size`].
    pub fn set_desired_pool_size(&self, size: usize) -> Result<(), SyncError> {
        self.pool.set_desired_pool_size(size)
    }

    /// Requested number of workers.
    #[must_use]
    pub fn desired_pool_size(&self) -> usize {
        self.pool.desired_pool_size()
    }

    /// Live workers.
    #[must_use]
    pub fn actual_pool_size(&self) -> usize {
        self.pool.actual_pool_size()
    }

    /// Pool lifecycle together with the task slot.
    #[must_use]
    pub fn state(&self) -> RepeaterState {
        RepeaterState {
            pool: self.pool.state(),
            repeating: self.slot.peek().is_some(),
            loans: self.slot.loans(),
        }
    }

    /// Pool snapshot.
    #[must_use]
    pub fn stats(&self) -> ThreadPoolStats {
        self.pool.stats()
    }

    /// Let running steps finish, then stop. The installed task is kept.
    ///
    /// # Errors
    ///
    /// As [`ThreadPool::shutdown_politely`].
    pub fn shutdown_politely(&self) -> Result<(), SyncError> {
        self.pool.shutdown_politely()
    }

    /// Interrupt every worker.
    ///
    /// # Errors
    ///
    /// As [`ThreadPool::shutdown_now`].
    pub fn shutdown_now(&self) -> Result<(), SyncError> {
        self.pool.shutdown_now()
    }

    /// Block until every worker has exited.
    ///
    /// # Errors
    ///
    /// As [`ThreadPool::await_shutdown`].
    pub fn await_shutdown(&self) -> Result<(), SyncError> {
        self.pool.await_shutdown()
    }

    /// Bounded [`await_shutdown`](Self::await_shutdown).
    ///
    /// # Errors
    ///
    /// As [`ThreadPool::try_await_shutdown`].
    pub fn try_await_shutdown(&self, timeout: Duration) -> Result<(), SyncError> {
        self.pool.try_await_shutdown(timeout)
    }

    /// Wait for termination from async code.
    ///
    /// # Errors
    ///
    /// As [`ThreadPool::await_shutdown_async`].
    #[cfg(feature = "tokio-runtime")]
    pub async fn await_shutdown_async(&self, timeout: Duration) -> Result<(), SyncError> {
        self.pool.await_shutdown_async(timeout).await
    }
}

impl fmt::Debug for RepeaterService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeaterService")
            .field("name", &self.pool.name())
            .field("state", &self.pool.state())
            .field("lending_mode", &self.lending_mode)
            .field("gated", &self.waitpoint.is_some())
            .field("repeating", &self.slot.peek().is_some())
            .finish()
    }
}
