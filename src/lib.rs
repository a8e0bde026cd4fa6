//! # Prometheus Concurrency
//!
//! Composable concurrency primitives for services that repeatedly execute work
//! on a dynamically sized worker pool.
//!
//! The pieces build on one another:
//!
//! - **Waitpoints** gate threads: a [`CloseableWaitpoint`](core::CloseableWaitpoint)
//!   opens and closes on command, a [`ThrottlingWaitpoint`](core::ThrottlingWaitpoint)
//!   limits the pass rate, an [`AllOfWaitpoint`](core::AllOfWaitpoint) combines gates.
//! - **Lendable references** hand one shared value between producer and
//!   consumer threads. Strict mode lends it to one taker at a time, relaxed mode
//!   to any number. A [`WaitpointLendableReference`](core::WaitpointLendableReference)
//!   puts a gate in front of the takers.
//! - **[`ThreadPool`](core::ThreadPool)** runs workers that pull units of work
//!   from a [`WorkerJob`](core::WorkerJob), with live resizing and a
//!   cooperative shutdown state machine.
//! - **[`RepeaterService`](core::RepeaterService)** glues the three together:
//!   "execute this task forever, on N workers, until told to stop".
//! - **Resequencers** restore index order to results produced out of order,
//!   either by buffering ([`ResequenceProcess`](core::ResequenceProcess)) or by
//!   making producers wait for their turn ([`SimpleResequencer`](core::SimpleResequencer)).
//!
//! Every blocking call has a bounded `try_*` counterpart and can be
//! interrupted through the blocked thread's
//! [`InterruptHandle`](core::InterruptHandle). No call polls.
//!
//! ## Repeating a task
//!
//! ```rust
//! use prometheus_concurrency::builders::{build_repeater, GateHandle};
//! use prometheus_concurrency::config::{RepeaterConfig, ThreadPoolConfig, WaitpointConfig};
//! use prometheus_concurrency::core::{default_handler, repeatable, LendingMode};
//!
//! let cfg = RepeaterConfig::new()
//!     .with_pool(ThreadPoolConfig::new().with_name("poller").with_pool_size(2))
//!     .with_lending_mode(LendingMode::Strict)
//!     .with_waitpoint(WaitpointConfig::Closeable { open: false });
//! let built = build_repeater(&cfg, default_handler()).unwrap();
//!
//! built.service.start().unwrap();
//! built.service.repeat(repeatable(|| Ok(false))).unwrap();
//! if let Some(GateHandle::Closeable(gate)) = &built.gate {
//!     gate.open();
//! }
//!
//! built.service.shutdown_politely().unwrap();
//! built.service.await_shutdown().unwrap();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Concurrency primitives and the services built from them.
pub mod core;
/// Configuration models for pools, repeaters and gates.
pub mod config;
/// Builders to construct repeater services from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;
