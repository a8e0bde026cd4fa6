//! Pool, repeater and service configuration structures.

use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::core::LendingMode;

/// Smallest stack accepted for worker threads.
pub const MIN_THREAD_STACK_SIZE: usize = 16 * 1024;

/// Thread pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadPoolConfig {
    /// Pool name, used as the worker thread name prefix and in logs.
    pub name: String,
    /// Number of workers started by `start()`.
    pub pool_size: usize,
    /// Stack size for worker threads; platform default if unset.
    pub thread_stack_size: Option<usize>,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            name: format!("pool-{}", &id[..8]),
            pool_size: num_cpus::get(),
            thread_stack_size: None,
        }
    }
}

impl ThreadPoolConfig {
    /// Defaults: one worker per CPU, generated name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the initial number of workers.
    #[must_use]
    pub const fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if let Some(stack) = self.thread_stack_size {
            if stack < MIN_THREAD_STACK_SIZE {
                return Err(format!(
                    "thread_stack_size must be at least {MIN_THREAD_STACK_SIZE} bytes"
                ));
            }
        }
        Ok(())
    }

    /// Read `<PREFIX>_POOL_NAME`, `<PREFIX>_POOL_SIZE` and
    /// `<PREFIX>_THREAD_STACK_SIZE` on top of the defaults, after loading a
    /// `.env` file if one exists.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Ok(name) = env::var(format!("{prefix}_POOL_NAME")) {
            cfg.name = name;
        }
        if let Some(size) = parse_env_usize(&format!("{prefix}_POOL_SIZE"))? {
            cfg.pool_size = size;
        }
        if let Some(stack) = parse_env_usize(&format!("{prefix}_THREAD_STACK_SIZE"))? {
            cfg.thread_stack_size = Some(stack);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_env_usize(key: &str) -> Result<Option<usize>, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("{key}: invalid number `{raw}`: {e}")),
        Err(_) => Ok(None),
    }
}

/// Gate placed in front of a repeater's task slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitpointConfig {
    /// No gate.
    #[default]
    None,
    /// Open/closed gate.
    Closeable {
        /// Initial state.
        open: bool,
    },
    /// Token-bucket throttle.
    Throttling {
        /// Sustained rate.
        permits_per_second: f64,
        /// Bucket size.
        burst: u32,
    },
}

impl WaitpointConfig {
    /// Validate gate parameters.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Throttling {
                permits_per_second,
                burst,
            } => {
                if !(permits_per_second.is_finite() && *permits_per_second > 0.0) {
                    return Err("permits_per_second must be positive".into());
                }
                if *burst == 0 {
                    return Err("burst must be greater than 0".into());
                }
                Ok(())
            }
            Self::None | Self::Closeable { .. } => Ok(()),
        }
    }
}

/// Repeater service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepeaterConfig {
    /// Worker pool settings.
    pub pool: ThreadPoolConfig,
    /// Whether workers share one task (relaxed) or run it one at a time (strict).
    pub lending_mode: LendingMode,
    /// Optional gate in front of the task slot.
    pub waitpoint: WaitpointConfig,
}

impl RepeaterConfig {
    /// Defaults: strict lending, no gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool settings.
    #[must_use]
    pub fn with_pool(mut self, pool: ThreadPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the lending mode.
    #[must_use]
    pub const fn with_lending_mode(mut self, mode: LendingMode) -> Self {
        self.lending_mode = mode;
        self
    }

    /// Set the gate.
    #[must_use]
    pub fn with_waitpoint(mut self, waitpoint: WaitpointConfig) -> Self {
        self.waitpoint = waitpoint;
        self
    }

    /// Validate pool and gate settings.
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate().map_err(|e| format!("pool: {e}"))?;
        self.waitpoint.validate().map_err(|e| format!("waitpoint: {e}"))
    }
}

/// Root configuration: named repeater services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Map of service name to configuration.
    pub repeaters: HashMap<String, RepeaterConfig>,
}

impl ServiceConfig {
    /// Validate every repeater and ensure at least one exists.
    pub fn validate(&self) -> Result<(), String> {
        if self.repeaters.is_empty() {
            return Err("at least one repeater must be defined".into());
        }
        for (name, repeater) in &self.repeaters {
            repeater
                .validate()
                .map_err(|e| format!("repeater `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
