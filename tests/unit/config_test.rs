//! Tests for configuration validation

use prometheus_concurrency::config::{
    LendingMode, RepeaterConfig, ServiceConfig, ThreadPoolConfig, WaitpointConfig,
};

#[test]
fn test_pool_config_validation() {
    let valid = ThreadPoolConfig::new().with_name("workers").with_pool_size(4);
    assert!(valid.validate().is_ok());
    assert_eq!(valid.pool_size, 4);
    assert_eq!(valid.thread_stack_size, None);
}

#[test]
fn test_pool_config_invalid_name() {
    let invalid = ThreadPoolConfig::new().with_name("  ");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_size_zero_is_allowed() {
    let idle = ThreadPoolConfig::new().with_pool_size(0);
    assert!(idle.validate().is_ok());
}

#[test]
fn test_waitpoint_config_invalid_rate() {
    let invalid = WaitpointConfig::Throttling {
        permits_per_second: -1.0,
        burst: 1,
    };
    assert!(invalid.validate().is_err());
    let invalid = WaitpointConfig::Throttling {
        permits_per_second: 10.0,
        burst: 0,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_repeater_config_defaults() {
    let cfg = RepeaterConfig::new();
    assert_eq!(cfg.lending_mode, LendingMode::Strict);
    assert_eq!(cfg.waitpoint, WaitpointConfig::None);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_service_config_validation() {
    let empty = ServiceConfig {
        repeaters: std::collections::HashMap::new(),
    };
    assert!(empty.validate().is_err());

    let mut repeaters = std::collections::HashMap::new();
    repeaters.insert(
        "poller".to_string(),
        RepeaterConfig::new().with_waitpoint(WaitpointConfig::Throttling {
            permits_per_second: 0.0,
            burst: 1,
        }),
    );
    let err = ServiceConfig { repeaters }.validate().unwrap_err();
    assert!(err.contains("poller"));
}

#[test]
fn test_service_config_from_json() {
    let json = r#"{
        "repeaters": {
            "ingest": {
                "pool": { "name": "ingest", "pool_size": 3 },
                "lending_mode": "relaxed",
                "waitpoint": { "kind": "closeable", "open": false }
            },
            "heartbeat": {
                "waitpoint": { "kind": "throttling", "permits_per_second": 2.0, "burst": 1 }
            }
        }
    }"#;
    let cfg = ServiceConfig::from_json_str(json).unwrap();
    let ingest = &cfg.repeaters["ingest"];
    assert_eq!(ingest.pool.pool_size, 3);
    assert_eq!(ingest.lending_mode, LendingMode::Relaxed);
    assert_eq!(ingest.waitpoint, WaitpointConfig::Closeable { open: false });
    assert_eq!(cfg.repeaters["heartbeat"].lending_mode, LendingMode::Strict);
}

#[test]
fn test_service_config_from_json_rejects_garbage() {
    assert!(ServiceConfig::from_json_str("{ not json").is_err());
    assert!(ServiceConfig::from_json_str(r#"{"repeaters": {}}"#).is_err());
}

#[test]
fn test_pool_config_from_env() {
    std::env::set_var("PCTEST_POOL_NAME", "from-env");
    std::env::set_var("PCTEST_POOL_SIZE", "5");
    let cfg = ThreadPoolConfig::from_env("PCTEST").unwrap();
    assert_eq!(cfg.name, "from-env");
    assert_eq!(cfg.pool_size, 5);

    std::env::set_var("PCBAD_POOL_SIZE", "many");
    assert!(ThreadPoolConfig::from_env("PCBAD").is_err());
}
