//! Tests for builder modules

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prometheus_concurrency::builders::{build_repeater, build_repeaters, GateHandle};
use prometheus_concurrency::config::{
    LendingMode, RepeaterConfig, ServiceConfig, ThreadPoolConfig, WaitpointConfig,
};
use prometheus_concurrency::core::{default_handler, repeatable, ExceptionHandler, ThreadPoolState};

#[test]
fn test_build_repeaters_names_pools_after_keys() {
    let cfg = ServiceConfig::from_json_str(
        r#"{
            "repeaters": {
                "alpha": { "pool": { "pool_size": 1 } },
                "beta": {
                    "pool": { "pool_size": 2 },
                    "lending_mode": "relaxed",
                    "waitpoint": { "kind": "throttling", "permits_per_second": 50.0, "burst": 5 }
                }
            }
        }"#,
    )
    .unwrap();

    let mut handler_calls = Vec::new();
    let built = build_repeaters(&cfg, |name, _| {
        handler_calls.push(name.to_string());
        default_handler()
    })
    .unwrap();

    handler_calls.sort();
    assert_eq!(handler_calls, vec!["alpha".to_string(), "beta".to_string()]);
    assert_eq!(built["alpha"].service.name(), "alpha");
    assert!(built["alpha"].gate.is_none());
    assert_eq!(built["beta"].service.lending_mode(), LendingMode::Relaxed);
    assert!(matches!(built["beta"].gate, Some(GateHandle::Throttling(_))));
    assert!(format!("{:?}", built["beta"].gate).contains("ThrottlingWaitpoint"));
    assert_eq!(built["beta"].service.state().pool, ThreadPoolState::Unstarted);
}

#[test]
fn test_build_repeater_rejects_invalid_config() {
    let cfg = RepeaterConfig::new().with_pool(ThreadPoolConfig::new().with_name(""));
    assert!(build_repeater(&cfg, default_handler()).is_err());
}

#[test]
fn test_gate_handle_pauses_built_repeater() {
    let cfg = RepeaterConfig::new()
        .with_pool(ThreadPoolConfig::new().with_name("paused").with_pool_size(1))
        .with_waitpoint(WaitpointConfig::Closeable { open: false });
    let built = build_repeater(&cfg, default_handler()).unwrap();
    let Some(GateHandle::Closeable(gate)) = built.gate.clone() else {
        panic!("expected a closeable gate");
    };

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    built.service.start().unwrap();
    built
        .service
        .repeat(repeatable(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }))
        .unwrap();

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    gate.open();
    while built.service.current_task().is_some() {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    built.service.shutdown_politely().unwrap();
    built.service.await_shutdown().unwrap();
}

#[test]
fn test_handler_factory_receives_failures() {
    struct Counting(AtomicUsize);
    impl ExceptionHandler for Counting {
        fn handle(&self, _error: &anyhow::Error) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let handler = Arc::new(Counting(AtomicUsize::new(0)));
    let cfg = RepeaterConfig::new()
        .with_pool(ThreadPoolConfig::new().with_name("failing").with_pool_size(1));
    let built = build_repeater(&cfg, Arc::clone(&handler) as Arc<dyn ExceptionHandler>).unwrap();
    built.service.start().unwrap();

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    built
        .service
        .repeat(repeatable(move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("transient failure");
            }
            Ok(false)
        }))
        .unwrap();

    while built.service.current_task().is_some() {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(handler.0.load(Ordering::SeqCst), 2);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    built.service.shutdown_politely().unwrap();
    built.service.await_shutdown().unwrap();
}
