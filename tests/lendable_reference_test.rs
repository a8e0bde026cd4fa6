//! Integration tests for lendable references
//!
//! These tests validate loan accounting under real thread contention:
//! - Strict references never lend twice at once
//! - Relaxed references lend concurrently and hold producers until loans drain
//! - Producers are not starved by a steady stream of relaxed takers
//! - Gated references pause takers but not producers

use prometheus_concurrency::core::{
    lendable_reference, CloseableWaitpoint, LendableReference, LendingMode,
    RelaxedLendableReference, StrictLendableReference, SyncError, Waitpoint,
    WaitpointLendableReference,
};
use prometheus_concurrency::util::init_tracing;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_strict_never_exceeds_one_loan() {
    init_tracing();
    let reference = Arc::new(StrictLendableReference::with_value(7_u32));
    let holding = Arc::new(AtomicUsize::new(0));
    let max_holding = Arc::new(AtomicUsize::new(0));

    let takers: Vec<_> = (0..6)
        .map(|_| {
            let reference = Arc::clone(&reference);
            let holding = Arc::clone(&holding);
            let max_holding = Arc::clone(&max_holding);
            thread::spawn(move || {
                for _ in 0..100 {
                    let value = reference.take().unwrap();
                    let now = holding.fetch_add(1, Ordering::SeqCst) + 1;
                    max_holding.fetch_max(now, Ordering::SeqCst);
                    assert_eq!(reference.loans(), 1);
                    holding.fetch_sub(1, Ordering::SeqCst);
                    reference.takeback(value).unwrap();
                }
            })
        })
        .collect();

    for taker in takers {
        taker.join().unwrap();
    }
    assert_eq!(max_holding.load(Ordering::SeqCst), 1);
    assert_eq!(reference.loans(), 0);
    assert_eq!(reference.peek(), Some(7));
}

#[test]
fn test_relaxed_lends_concurrently_and_put_waits() {
    let reference = Arc::new(RelaxedLendableReference::with_value("v1".to_string()));
    let all_taken = Arc::new(Barrier::new(4));
    let release = Arc::new(Barrier::new(4));

    let takers: Vec<_> = (0..3)
        .map(|_| {
            let reference = Arc::clone(&reference);
            let all_taken = Arc::clone(&all_taken);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                let value = reference.take().unwrap();
                all_taken.wait();
                release.wait();
                reference.takeback(value).unwrap();
            })
        })
        .collect();

    all_taken.wait();
    assert_eq!(reference.loans(), 3);

    assert_eq!(
        reference.try_put("v2".to_string(), Duration::from_millis(30)),
        Err(SyncError::Timeout)
    );
    assert_eq!(reference.peek().as_deref(), Some("v1"));

    let producer = {
        let reference = Arc::clone(&reference);
        thread::spawn(move || reference.put("v2".to_string()))
    };
    thread::sleep(Duration::from_millis(20));
    assert!(!producer.is_finished());

    release.wait();
    for taker in takers {
        taker.join().unwrap();
    }
    assert_eq!(producer.join().unwrap().unwrap().as_deref(), Some("v1"));
    assert_eq!(reference.peek().as_deref(), Some("v2"));
}

#[test]
fn test_put_is_not_starved_by_relaxed_takers() {
    let reference = lendable_reference::<u64>(LendingMode::Relaxed);
    reference.put(0).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let takers: Vec<_> = (0..4)
        .map(|_| {
            let reference = Arc::clone(&reference);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let value = reference.take().unwrap();
                    thread::sleep(Duration::from_millis(2));
                    reference.takeback(value).unwrap();
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    let started = Instant::now();
    for next in 1..=5 {
        reference.try_put(next, Duration::from_secs(2)).unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(2));

    stop.store(true, Ordering::SeqCst);
    for taker in takers {
        taker.join().unwrap();
    }
    assert_eq!(reference.peek(), Some(5));
}

#[test]
fn test_takeback_and_reset_empties_slot_for_producer() {
    let reference = Arc::new(StrictLendableReference::with_value(1_u8));
    let value = reference.take().unwrap();

    let blocked_taker = {
        let reference = Arc::clone(&reference);
        thread::spawn(move || reference.try_take(Duration::from_millis(50)))
    };

    reference.takeback_and_reset(value).unwrap();
    assert_eq!(blocked_taker.join().unwrap(), Err(SyncError::Timeout));
    assert_eq!(reference.peek(), None);
    assert_eq!(reference.put(2).unwrap(), None);
}

#[test]
fn test_gate_pauses_takers_not_producers() {
    let gate = Arc::new(CloseableWaitpoint::new(false));
    let reference: Arc<WaitpointLendableReference<u32, StrictLendableReference<u32>>> =
        Arc::new(WaitpointLendableReference::new(
            Arc::new(StrictLendableReference::new()),
            Arc::clone(&gate) as Arc<dyn Waitpoint>,
        ));

    assert_eq!(reference.try_put(3, Duration::from_millis(50)), Ok(None));
    assert_eq!(
        reference.try_take(Duration::from_millis(30)),
        Err(SyncError::Timeout)
    );
    assert_eq!(reference.loans(), 0);

    let taker = {
        let reference = Arc::clone(&reference);
        thread::spawn(move || reference.take())
    };
    thread::sleep(Duration::from_millis(20));
    gate.open();
    assert_eq!(taker.join().unwrap(), Ok(3));
    assert_eq!(reference.loans(), 1);
    reference.takeback(3).unwrap();
}

#[test]
fn test_over_release_is_rejected() {
    let reference = StrictLendableReference::with_value('x');
    assert!(matches!(
        reference.takeback('x'),
        Err(SyncError::IllegalState(_))
    ));
    assert_eq!(reference.loans(), 0);
}
