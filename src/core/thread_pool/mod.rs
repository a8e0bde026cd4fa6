//! Resizable pool of worker threads pulling work from a [`WorkerJob`].
//!
//! # Lifecycle
//!
//! ```text
//! Unstarted --start()--> Started --shutdown_politely()--> ShuttingDownPolitely --+
//!                           |                                    |               |
//!                           +------shutdown_now()-----> ShuttingDownForced ------+--> Shutdown
//! ```
//!
//! Workers loop: take a unit of work (blocking), execute it, then check whether
//! the pool still wants them. Shrinking and shutdown are cooperative: a worker
//! never abandons a unit it has started, except that a forced shutdown
//! interrupts it. Idle workers blocked in [`WorkerJob::take_work`] are
//! interrupted so they notice the change.
//!
//! # Example
//!
//! ```rust
//! use prometheus_concurrency::config::ThreadPoolConfig;
//! use prometheus_concurrency::core::{
//!     CloseableWaitpoint, NoOpExceptionHandler, SyncError, ThreadPool, Waitpoint, WorkerJob,
//! };
//! use std::sync::Arc;
//!
//! struct Gated(CloseableWaitpoint);
//!
//! impl WorkerJob for Gated {
//!     type Work = ();
//!     fn take_work(&self) -> Result<(), SyncError> {
//!         self.0.pass()
//!     }
//!     fn execute_work(&self, (): ()) -> anyhow::Result<bool> {
//!         Ok(true)
//!     }
//! }
//!
//! let pool = ThreadPool::new(
//!     ThreadPoolConfig::new().with_name("docs").with_pool_size(2),
//!     Gated(CloseableWaitpoint::new(false)),
//!     Arc::new(NoOpExceptionHandler),
//! )
//! .unwrap();
//! pool.start().unwrap();
//! pool.shutdown_politely().unwrap();
//! pool.await_shutdown().unwrap();
//! ```

mod native;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::{AppResult, SyncError};

pub use native::ThreadPool;

/// Lifecycle state of a [`ThreadPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPoolState {
    /// Constructed, no workers yet.
    Unstarted,
    /// Workers running; resizing allowed.
    Started,
    /// Workers finish their current unit, then exit.
    ShuttingDownPolitely,
    /// Workers are interrupted and exit.
    ShuttingDownForced,
    /// Every worker has exited.
    Shutdown,
}

impl ThreadPoolState {
    /// True in either shutting-down state.
    #[must_use]
    pub const fn is_shutting_down(self) -> bool {
        matches!(self, Self::ShuttingDownPolitely | Self::ShuttingDownForced)
    }
}

impl fmt::Display for ThreadPoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unstarted => "unstarted",
            Self::Started => "started",
            Self::ShuttingDownPolitely => "shutting_down_politely",
            Self::ShuttingDownForced => "shutting_down_forced",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Source of work for a [`ThreadPool`].
///
/// `take_work` should block through the primitives in this crate (lendable
/// references, waitpoints) so that resizing and shutdown can interrupt it.
pub trait WorkerJob: Send + Sync + 'static {
    /// One unit of work.
    type Work: Send;

    /// Block until a unit of work is available.
    ///
    /// # Errors
    ///
    /// [`SyncError::Interrupted`] when the pool wants the worker back; other
    /// errors are reported to the exception handler.
    fn take_work(&self) -> Result<Self::Work, SyncError>;

    /// Execute one unit. `Ok(false)` retires the calling worker and lowers
    /// the desired pool size by one.
    ///
    /// # Errors
    ///
    /// Any error is passed to the pool's exception handler; the worker keeps running.
    fn execute_work(&self, work: Self::Work) -> AppResult<bool>;
}

/// Snapshot of a pool for management surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPoolStats {
    /// Pool name.
    pub name: String,
    /// Lifecycle state.
    pub state: ThreadPoolState,
    /// Requested number of workers.
    pub desired_pool_size: usize,
    /// Live workers, including ones about to retire.
    pub actual_pool_size: usize,
    /// Workers currently waiting for work.
    pub idle_workers: usize,
    /// Units that completed without error.
    pub completed_units: u64,
    /// Units (or work takes) that failed.
    pub failed_units: u64,
}

/// Internal counters for pool statistics (lock-free).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub completed_units: AtomicU64,
    pub failed_units: AtomicU64,
}

impl PoolCounters {
    pub fn record_completed(&self) {
        self.completed_units.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed_units.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed(&self) -> u64 {
        self.completed_units.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed_units.load(Ordering::Relaxed)
    }
}
