//! Configuration models for pools, repeaters and their gates.

pub mod pool;

pub use crate::core::LendingMode;
pub use pool::{RepeaterConfig, ServiceConfig, ThreadPoolConfig, WaitpointConfig, MIN_THREAD_STACK_SIZE};
