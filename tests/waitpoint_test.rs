//! Integration tests for waitpoints
//!
//! These tests validate gate behaviour across threads:
//! - Closing and reopening a gate with several blocked passers
//! - Throttling rate limits and runtime re-rating
//! - Composite gates sharing one timeout budget
//! - Interrupting a blocked passer

use prometheus_concurrency::core::{
    AllOfWaitpoint, CloseableWaitpoint, InterruptHandle, SyncError, ThrottlingWaitpoint, Waitpoint,
};
use prometheus_concurrency::util::init_tracing;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_open_releases_every_blocked_passer() {
    init_tracing();
    let gate = Arc::new(CloseableWaitpoint::new(false));
    let passed = Arc::new(AtomicUsize::new(0));

    let passers: Vec<_> = (0..4)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let passed = Arc::clone(&passed);
            thread::spawn(move || {
                gate.pass().unwrap();
                passed.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(passed.load(Ordering::SeqCst), 0);

    gate.open();
    for passer in passers {
        passer.join().unwrap();
    }
    assert_eq!(passed.load(Ordering::SeqCst), 4);
}

#[test]
fn test_closed_gate_times_out() {
    let gate = CloseableWaitpoint::new(false);
    let started = Instant::now();
    assert_eq!(
        gate.try_pass(Duration::from_millis(30)),
        Err(SyncError::Timeout)
    );
    assert!(started.elapsed() >= Duration::from_millis(25));
    assert!(!gate.is_passable());
}

#[test]
fn test_throttle_spaces_out_passes() {
    let gate = ThrottlingWaitpoint::new(20.0, 1).unwrap();
    let started = Instant::now();
    for _ in 0..5 {
        gate.pass().unwrap();
    }
    // One permit up front, then one every 50ms.
    assert!(started.elapsed() >= Duration::from_millis(180));
}

#[test]
fn test_throttle_rerate_applies_to_waiters() {
    let gate = Arc::new(ThrottlingWaitpoint::new(0.5, 1).unwrap());
    gate.pass().unwrap();

    let waiter = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || {
            let started = Instant::now();
            gate.pass().unwrap();
            started.elapsed()
        })
    };
    thread::sleep(Duration::from_millis(20));
    gate.set_rate(1000.0).unwrap();

    let waited = waiter.join().unwrap();
    assert!(waited < Duration::from_millis(1000));
    assert!((gate.rate() - 1000.0).abs() < f64::EPSILON);
}

#[test]
fn test_composite_gate_spends_one_budget() {
    let open: Arc<dyn Waitpoint> = Arc::new(CloseableWaitpoint::new(true));
    let closed = Arc::new(CloseableWaitpoint::new(false));
    let composite = AllOfWaitpoint::new(vec![open, Arc::clone(&closed) as Arc<dyn Waitpoint>]);

    assert!(!composite.is_passable());
    assert_eq!(
        composite.try_pass(Duration::from_millis(20)),
        Err(SyncError::Timeout)
    );

    closed.open();
    let remaining = composite.try_pass(Duration::from_millis(500)).unwrap();
    assert!(remaining <= Duration::from_millis(500));
}

#[test]
fn test_interrupt_unblocks_passer() {
    let gate = Arc::new(CloseableWaitpoint::new(false));
    let (tx, rx) = mpsc::channel();
    let waiter = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || {
            tx.send(InterruptHandle::current()).unwrap();
            let first = gate.pass();
            // The flag is cleared by the failed wait.
            let second = gate.try_pass(Duration::from_millis(10));
            (first, second)
        })
    };

    let handle = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(20));
    handle.interrupt();

    let (first, second) = waiter.join().unwrap();
    assert_eq!(first, Err(SyncError::Interrupted));
    assert_eq!(second, Err(SyncError::Timeout));
}

#[test]
fn test_close_does_not_recall_passed_threads() {
    let gate = Arc::new(CloseableWaitpoint::new(false));
    let (passed_tx, passed_rx) = mpsc::channel();
    let (finish_tx, finish_rx) = mpsc::channel::<()>();

    let passer = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || {
            gate.pass().unwrap();
            passed_tx.send(()).unwrap();
            finish_rx.recv().unwrap();
            "finished inside"
        })
    };

    thread::sleep(Duration::from_millis(20));
    gate.open();
    passed_rx.recv().unwrap();
    gate.close();
    finish_tx.send(()).unwrap();
    assert_eq!(passer.join().unwrap(), "finished inside");
    assert!(!gate.is_passable());
}
