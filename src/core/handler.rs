//! Exception handlers: where failed units of work are reported.

use std::sync::Arc;

use tracing::error;

/// Receives errors raised by units of work executed on pool workers.
///
/// A handler that panics escalates: the worker running the failed unit
/// terminates (the pool still accounts for it).
pub trait ExceptionHandler: Send + Sync {
    /// Handle one failure.
    fn handle(&self, error: &anyhow::Error);
}

impl<F> ExceptionHandler for F
where
    F: Fn(&anyhow::Error) + Send + Sync,
{
    fn handle(&self, error: &anyhow::Error) {
        self(error);
    }
}

/// Discards every error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpExceptionHandler;

impl ExceptionHandler for NoOpExceptionHandler {
    fn handle(&self, _error: &anyhow::Error) {}
}

/// Logs every error at `ERROR` level with its full cause chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingExceptionHandler;

impl ExceptionHandler for TracingExceptionHandler {
    fn handle(&self, error: &anyhow::Error) {
        error!(error = format!("{error:#}"), "unit of work failed");
    }
}

/// Handler used when none is configured.
#[must_use]
pub fn default_handler() -> Arc<dyn ExceptionHandler> {
    Arc::new(TracingExceptionHandler)
}
