//! Integration tests for ThreadPool
//!
//! These tests drive the pool through its public API:
//! - Workers blocked on a lendable reference are woken by resizing and shutdown
//! - Live resizing while units are running
//! - Stats snapshots serialize for management surfaces
//! - Async termination wait

use prometheus_concurrency::config::ThreadPoolConfig;
use prometheus_concurrency::core::{
    AppResult, LendableReference, NoOpExceptionHandler, StrictLendableReference, SyncError,
    ThreadPool, ThreadPoolState, WorkerJob,
};
use prometheus_concurrency::util::init_tracing;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Workers borrow a batch size from a strict reference, "process" it and return it.
struct BatchJob {
    batch: StrictLendableReference<u32>,
    processed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl BatchJob {
    fn new() -> Self {
        Self {
            batch: StrictLendableReference::new(),
            processed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl WorkerJob for BatchJob {
    type Work = u32;

    fn take_work(&self) -> Result<u32, SyncError> {
        self.batch.take()
    }

    fn execute_work(&self, size: u32) -> AppResult<bool> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(2));
        self.processed.fetch_add(size as usize, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.batch.takeback(size)?;
        Ok(true)
    }
}

fn batch_pool(name: &str, size: usize) -> ThreadPool<BatchJob> {
    ThreadPool::new(
        ThreadPoolConfig::new().with_name(name).with_pool_size(size),
        BatchJob::new(),
        Arc::new(NoOpExceptionHandler),
    )
    .unwrap()
}

// ============================================================================
// TESTS
// ============================================================================

#[test]
fn test_idle_workers_wake_for_shutdown() {
    init_tracing();
    let pool = batch_pool("idle", 3);
    pool.start().unwrap();
    assert!(eventually(Duration::from_secs(2), || pool.stats().idle_workers == 3));

    pool.shutdown_politely().unwrap();
    pool.try_await_shutdown(Duration::from_secs(5)).unwrap();
    assert_eq!(pool.state(), ThreadPoolState::Shutdown);
    assert_eq!(pool.actual_pool_size(), 0);
    assert_eq!(pool.job().batch.loans(), 0);
}

#[test]
fn test_resize_while_running() {
    let pool = batch_pool("resizing", 2);
    pool.start().unwrap();
    pool.job().batch.put(10).unwrap();

    assert!(eventually(Duration::from_secs(2), || {
        pool.job().processed.load(Ordering::SeqCst) >= 50
    }));

    pool.set_desired_pool_size(6).unwrap();
    assert_eq!(pool.actual_pool_size(), 6);
    pool.set_desired_pool_size(1).unwrap();
    assert!(eventually(Duration::from_secs(2), || pool.actual_pool_size() == 1));

    let before = pool.job().processed.load(Ordering::SeqCst);
    assert!(eventually(Duration::from_secs(2), || {
        pool.job().processed.load(Ordering::SeqCst) > before
    }));

    pool.shutdown_politely().unwrap();
    pool.try_await_shutdown(Duration::from_secs(5)).unwrap();
    assert_eq!(pool.job().max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(pool.job().batch.loans(), 0);
    assert!(pool.stats().completed_units > 0);
}

#[test]
fn test_stats_serialize() {
    let pool = batch_pool("stats", 2);
    pool.start().unwrap();

    let stats = pool.stats();
    assert_eq!(stats.name, "stats");
    assert_eq!(stats.desired_pool_size, 2);
    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["state"], "started");
    assert_eq!(json["actual_pool_size"], 2);

    pool.shutdown_now().unwrap();
    pool.try_await_shutdown(Duration::from_secs(5)).unwrap();
}

#[test]
fn test_shutdown_now_after_polite_request() {
    let pool = batch_pool("escalate", 2);
    pool.start().unwrap();
    pool.shutdown_politely().unwrap();
    // Either the polite shutdown already finished, or it is escalated.
    match pool.shutdown_now() {
        Ok(()) | Err(SyncError::IllegalState(_)) => {}
        Err(other) => panic!("unexpected error: {other}"),
    }
    pool.try_await_shutdown(Duration::from_secs(5)).unwrap();
    assert_eq!(pool.state(), ThreadPoolState::Shutdown);
}

#[tokio::test]
async fn test_await_shutdown_async() {
    let pool = batch_pool("async", 2);
    pool.start().unwrap();
    pool.job().batch.put(1).unwrap();

    pool.shutdown_politely().unwrap();
    pool.await_shutdown_async(Duration::from_secs(5)).await.unwrap();
    assert_eq!(pool.state(), ThreadPoolState::Shutdown);
}

#[tokio::test]
async fn test_await_shutdown_async_times_out() {
    let pool = batch_pool("async-timeout", 1);
    pool.start().unwrap();
    assert_eq!(
        pool.await_shutdown_async(Duration::from_millis(20)).await,
        Err(SyncError::Timeout)
    );
    pool.shutdown_now().unwrap();
}
