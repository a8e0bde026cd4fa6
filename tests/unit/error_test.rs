//! Tests for error types

use prometheus_concurrency::core::{AppResult, SyncError};

#[test]
fn test_illegal_state_error() {
    let err = SyncError::IllegalState("pool already started".to_string());
    assert_eq!(format!("{}", err), "illegal state: pool already started");
}

#[test]
fn test_capacity_exceeded_error() {
    let err = SyncError::CapacityExceeded(4);
    assert_eq!(format!("{}", err), "capacity exceeded: 4 items buffered");
}

#[test]
fn test_duplicate_sequence_error() {
    let err = SyncError::DuplicateSequence {
        index: 3,
        watermark: Some(7),
    };
    assert_eq!(
        format!("{}", err),
        "duplicate sequence index 3 (last returned: Some(7))"
    );
}

#[test]
fn test_wait_aborted_classification() {
    assert!(SyncError::Timeout.is_wait_aborted());
    assert!(SyncError::Interrupted.is_wait_aborted());
    assert!(!SyncError::Rejected("stopped".into()).is_wait_aborted());
    assert!(!SyncError::IllegalArgument("bad id".into()).is_wait_aborted());
}

#[test]
fn test_sync_error_converts_into_app_error() {
    fn step() -> AppResult<bool> {
        Err(SyncError::Timeout)?;
        Ok(true)
    }
    let err = step().unwrap_err();
    assert_eq!(err.downcast_ref::<SyncError>(), Some(&SyncError::Timeout));
}
