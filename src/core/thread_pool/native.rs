//! Native implementation of `ThreadPool` using OS threads.
//!
//! # Design Principles
//!
//! - **One lock**: state, sizes and the worker registry share one monitor
//! - **No polling**: idle workers are woken through their interrupt handles
//! - **Cooperative exit**: workers retire between units, never during one
//! - **Accounted exits**: a worker that dies unwinding still leaves the registry

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ThreadPoolConfig;
use crate::core::handler::ExceptionHandler;
use crate::core::interrupt::InterruptHandle;
use crate::core::monitor::{deadline_after, Monitor};
use crate::core::SyncError;

use super::{PoolCounters, ThreadPoolState, ThreadPoolStats, WorkerJob};

struct WorkerEntry {
    interrupt: InterruptHandle,
    /// Blocked in `take_work`, so safe to interrupt.
    idle: bool,
}

struct PoolInner {
    state: ThreadPoolState,
    desired: usize,
    actual: usize,
    workers: HashMap<u64, WorkerEntry>,
    next_worker_id: u64,
}

impl PoolInner {
    fn retirement_reason(&self) -> Option<&'static str> {
        if self.state.is_shutting_down() || self.state == ThreadPoolState::Shutdown {
            Some("pool shutting down")
        } else if self.actual > self.desired {
            Some("pool shrunk")
        } else {
            None
        }
    }

    /// Raise the interrupt flag of idle (or all) workers. The returned handles
    /// must be woken after the pool lock is released.
    fn raise_workers(&self, idle_only: bool) -> Vec<InterruptHandle> {
        self.workers
            .values()
            .filter(|worker| !idle_only || worker.idle)
            .map(|worker| {
                worker.interrupt.raise();
                worker.interrupt.clone()
            })
            .collect()
    }

    fn idle_workers(&self) -> usize {
        self.workers.values().filter(|worker| worker.idle).count()
    }
}

fn wake_all(handles: Vec<InterruptHandle>) {
    for handle in handles {
        handle.wake();
    }
}

/// State shared between the pool handle and its workers.
pub(crate) struct Shared<J> {
    config: ThreadPoolConfig,
    job: J,
    handler: Arc<dyn ExceptionHandler>,
    counters: PoolCounters,
    monitor: Arc<Monitor<PoolInner>>,
}

impl<J: WorkerJob> Shared<J> {
    fn spawn_workers(self: &Arc<Self>, inner: &mut PoolInner, count: usize) -> Result<(), SyncError> {
        for _ in 0..count {
            let worker_id = inner.next_worker_id;
            inner.next_worker_id += 1;

            let interrupt = InterruptHandle::new();
            let mut builder = thread::Builder::new().name(format!("{}-{worker_id}", self.config.name));
            if let Some(stack_size) = self.config.thread_stack_size {
                builder = builder.stack_size(stack_size);
            }
            let shared = Arc::clone(self);
            let worker_interrupt = interrupt.clone();
            builder
                .spawn(move || run_worker(&shared, worker_id, worker_interrupt))
                .map_err(|e| SyncError::Spawn(e.to_string()))?;

            // The new thread blocks on the pool lock until the caller releases it.
            inner.workers.insert(
                worker_id,
                WorkerEntry {
                    interrupt,
                    idle: false,
                },
            );
            inner.actual += 1;
        }
        Ok(())
    }

    fn retire(&self, inner: &mut PoolInner, worker_id: u64) {
        inner.workers.remove(&worker_id);
        inner.actual = inner.actual.saturating_sub(1);
        if inner.actual == 0 && inner.state.is_shutting_down() {
            inner.state = ThreadPoolState::Shutdown;
            info!(pool = %self.config.name, "thread pool shut down");
        }
        self.monitor.notify_all();
    }

    fn force_shutdown(&self, inner: &mut PoolInner) -> Vec<InterruptHandle> {
        inner.state = ThreadPoolState::ShuttingDownForced;
        if inner.actual == 0 {
            inner.state = ThreadPoolState::Shutdown;
            self.monitor.notify_all();
        }
        inner.raise_workers(false)
    }

    fn await_termination(&self, deadline: Option<Instant>) -> Result<(), SyncError> {
        let mut inner = self.monitor.lock();
        if inner.state == ThreadPoolState::Unstarted {
            return Err(SyncError::IllegalState(format!(
                "pool `{}` was never started",
                self.config.name
            )));
        }
        self.monitor
            .await_while(&mut inner, deadline, |inner| inner.state != ThreadPoolState::Shutdown)
    }

    /// Run one unit. Returns whether the worker should keep going.
    fn execute(&self, worker_id: u64, work: J::Work) -> bool {
        match self.job.execute_work(work) {
            Ok(keep_going) => {
                self.counters.record_completed();
                keep_going
            }
            Err(error) => {
                self.counters.record_failed();
                warn!(
                    pool = %self.config.name,
                    worker_id,
                    error = %error,
                    "unit of work failed"
                );
                self.handler.handle(&error);
                true
            }
        }
    }
}

/// Removes the worker from the registry if it unwinds instead of retiring.
struct WorkerExit<'a, J: WorkerJob> {
    shared: &'a Shared<J>,
    worker_id: u64,
    retired: bool,
}

impl<J: WorkerJob> Drop for WorkerExit<'_, J> {
    fn drop(&mut self) {
        if self.retired {
            return;
        }
        let mut inner = self.shared.monitor.lock();
        self.shared.retire(&mut inner, self.worker_id);
        warn!(
            pool = %self.shared.config.name,
            worker_id = self.worker_id,
            "worker terminated abnormally"
        );
    }
}

fn run_worker<J: WorkerJob>(shared: &Arc<Shared<J>>, worker_id: u64, handle: InterruptHandle) {
    handle.clone().install();
    let mut exit = WorkerExit::<J> {
        shared,
        worker_id,
        retired: false,
    };
    debug!(pool = %shared.config.name, worker_id, "worker started");

    loop {
        {
            let mut inner = shared.monitor.lock();
            if let Some(reason) = inner.retirement_reason() {
                shared.retire(&mut inner, worker_id);
                exit.retired = true;
                debug!(pool = %shared.config.name, worker_id, reason, "worker exiting");
                return;
            }
            if let Some(entry) = inner.workers.get_mut(&worker_id) {
                entry.idle = true;
            }
        }

        let taken = shared.job.take_work();

        {
            let mut inner = shared.monitor.lock();
            if let Some(entry) = inner.workers.get_mut(&worker_id) {
                entry.idle = false;
            }
            // An interrupt aimed at the idle worker must not leak into the unit
            // it just took. Forced shutdown interrupts busy workers on purpose.
            if inner.state != ThreadPoolState::ShuttingDownForced {
                handle.take_raised();
            }
        }

        match taken {
            Ok(work) => {
                if !shared.execute(worker_id, work) {
                    let mut inner = shared.monitor.lock();
                    inner.desired = inner.desired.saturating_sub(1);
                    shared.retire(&mut inner, worker_id);
                    exit.retired = true;
                    debug!(pool = %shared.config.name, worker_id, "worker retired by its job");
                    return;
                }
            }
            Err(SyncError::Interrupted) => {
                debug!(pool = %shared.config.name, worker_id, "worker interrupted while idle");
            }
            Err(error) => {
                shared.counters.record_failed();
                warn!(pool = %shared.config.name, worker_id, error = %error, "taking work failed");
                shared.handler.handle(&error.into());
            }
        }
    }
}

/// Worker pool with dedicated OS threads and a live-resizable size.
///
/// Dropping a pool that is still running forces shutdown; workers are
/// interrupted and exit on their own, they are not joined.
pub struct ThreadPool<J: WorkerJob> {
    shared: Arc<Shared<J>>,
}

impl<J: WorkerJob> ThreadPool<J> {
    /// Create an unstarted pool.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::IllegalArgument` if the configuration is invalid.
    pub fn new(
        config: ThreadPoolConfig,
        job: J,
        handler: Arc<dyn ExceptionHandler>,
    ) -> Result<Self, SyncError> {
        config.validate().map_err(SyncError::IllegalArgument)?;
        let desired = config.pool_size;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                job,
                handler,
                counters: PoolCounters::default(),
                monitor: Monitor::new(PoolInner {
                    state: ThreadPoolState::Unstarted,
                    desired,
                    actual: 0,
                    workers: HashMap::new(),
                    next_worker_id: 0,
                }),
            }),
        })
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// The job the workers pull from.
    #[must_use]
    pub fn job(&self) -> &J {
        &self.shared.job
    }

    /// Spawn the configured number of workers.
    ///
    /// # Errors
    ///
    /// - `SyncError::IllegalState` if the pool was already started
    /// - `SyncError::Spawn` if a worker thread could not be created
    pub fn start(&self) -> Result<(), SyncError> {
        let mut inner = self.shared.monitor.lock();
        if inner.state != ThreadPoolState::Unstarted {
            return Err(SyncError::IllegalState(format!(
                "cannot start pool `{}` in state {}",
                self.name(),
                inner.state
            )));
        }
        inner.state = ThreadPoolState::Started;
        let desired = inner.desired;
        self.shared.spawn_workers(&mut inner, desired)?;
        info!(pool = %self.name(), workers = desired, "thread pool started");
        Ok(())
    }

    /// Change the number of workers.
    ///
    /// Growing spawns workers immediately. Shrinking wakes idle workers; the
    /// excess retire after their current unit.
    ///
    /// # Errors
    ///
    /// - `SyncError::IllegalState` unless the pool is started
    /// - `SyncError::Spawn` if a worker thread could not be created
    pub fn set_desired_pool_size(&self, size: usize) -> Result<(), SyncError> {
        let to_wake = {
            let mut inner = self.shared.monitor.lock();
            if inner.state != ThreadPoolState::Started {
                return Err(SyncError::IllegalState(format!(
                    "cannot resize pool `{}` in state {}",
                    self.name(),
                    inner.state
                )));
            }
            let previous = inner.desired;
            inner.desired = size;
            info!(pool = %self.name(), previous, desired = size, "thread pool resized");
            if size > inner.actual {
                let missing = size - inner.actual;
                self.shared.spawn_workers(&mut inner, missing)?;
                Vec::new()
            } else if size < inner.actual {
                inner.raise_workers(true)
            } else {
                Vec::new()
            }
        };
        wake_all(to_wake);
        Ok(())
    }

    /// Requested number of workers.
    #[must_use]
    pub fn desired_pool_size(&self) -> usize {
        self.shared.monitor.lock().desired
    }

    /// Live workers, including ones that are about to retire.
    #[must_use]
    pub fn actual_pool_size(&self) -> usize {
        self.shared.monitor.lock().actual
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ThreadPoolState {
        self.shared.monitor.lock().state
    }

    /// Snapshot for management surfaces.
    #[must_use]
    pub fn stats(&self) -> ThreadPoolStats {
        let inner = self.shared.monitor.lock();
        ThreadPoolStats {
            name: self.name().to_owned(),
            state: inner.state,
            desired_pool_size: inner.desired,
            actual_pool_size: inner.actual,
            idle_workers: inner.idle_workers(),
            completed_units: self.shared.counters.completed(),
            failed_units: self.shared.counters.failed(),
        }
    }

    /// Stop taking new work; running units finish, idle workers are woken and exit.
    ///
    /// Calling it again while shutting down is a no-op.
    ///
    /// # Errors
    ///
    /// `SyncError::IllegalState` if the pool is unstarted or already shut down.
    pub fn shutdown_politely(&self) -> Result<(), SyncError> {
        let to_wake = {
            let mut inner = self.shared.monitor.lock();
            match inner.state {
                ThreadPoolState::Started => {}
                ThreadPoolState::ShuttingDownPolitely | ThreadPoolState::ShuttingDownForced => {
                    return Ok(());
                }
                ThreadPoolState::Unstarted | ThreadPoolState::Shutdown => {
                    return Err(SyncError::IllegalState(format!(
                        "cannot shut down pool `{}` in state {}",
                        self.name(),
                        inner.state
                    )));
                }
            }
            inner.state = ThreadPoolState::ShuttingDownPolitely;
            info!(pool = %self.name(), workers = inner.actual, "thread pool shutting down politely");
            if inner.actual == 0 {
                inner.state = ThreadPoolState::Shutdown;
                self.shared.monitor.notify_all();
            }
            inner.raise_workers(true)
        };
        wake_all(to_wake);
        Ok(())
    }

    /// Interrupt every worker, including ones in the middle of a unit.
    ///
    /// # Errors
    ///
    /// `SyncError::IllegalState` if the pool is unstarted or already shut down.
    pub fn shutdown_now(&self) -> Result<(), SyncError> {
        let to_wake = {
            let mut inner = self.shared.monitor.lock();
            match inner.state {
                ThreadPoolState::Started | ThreadPoolState::ShuttingDownPolitely => {}
                ThreadPoolState::ShuttingDownForced => return Ok(()),
                ThreadPoolState::Unstarted | ThreadPoolState::Shutdown => {
                    return Err(SyncError::IllegalState(format!(
                        "cannot shut down pool `{}` in state {}",
                        self.name(),
                        inner.state
                    )));
                }
            }
            info!(pool = %self.name(), workers = inner.actual, "thread pool shutting down now");
            self.shared.force_shutdown(&mut inner)
        };
        wake_all(to_wake);
        Ok(())
    }

    /// Block until every worker has exited.
    ///
    /// # Errors
    ///
    /// - `SyncError::IllegalState` if the pool was never started
    /// - `SyncError::Interrupted` if the calling thread is interrupted
    pub fn await_shutdown(&self) -> Result<(), SyncError> {
        self.shared.await_termination(None)
    }

    /// Bounded [`await_shutdown`](Self::await_shutdown).
    ///
    /// # Errors
    ///
    /// As `await_shutdown`, plus `SyncError::Timeout`.
    pub fn try_await_shutdown(&self, timeout: Duration) -> Result<(), SyncError> {
        self.shared.await_termination(deadline_after(timeout))
    }

    /// Wait for termination from async code.
    ///
    /// The wait runs on tokio's blocking thread pool.
    ///
    /// # Errors
    ///
    /// As [`try_await_shutdown`](Self::try_await_shutdown).
    #[cfg(feature = "tokio-runtime")]
    pub async fn await_shutdown_async(&self, timeout: Duration) -> Result<(), SyncError> {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || shared.await_termination(deadline_after(timeout)))
            .await
            .map_err(|e| SyncError::IllegalState(format!("shutdown wait task failed: {e}")))?
    }
}

impl<J: WorkerJob> Drop for ThreadPool<J> {
    fn drop(&mut self) {
        let to_wake = {
            let mut inner = self.shared.monitor.lock();
            if matches!(
                inner.state,
                ThreadPoolState::Started | ThreadPoolState::ShuttingDownPolitely
            ) {
                debug!(pool = %self.shared.config.name, "ThreadPool dropped while running - forcing shutdown");
                self.shared.force_shutdown(&mut inner)
            } else {
                Vec::new()
            }
        };
        wake_all(to_wake);
    }
}
