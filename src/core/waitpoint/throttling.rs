//! Rate-limiting gate based on a token bucket.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::core::monitor::{deadline_after, Monitor};
use crate::core::SyncError;

use super::{remaining_until, Waitpoint};

struct Bucket {
    tokens: f64,
    burst: f64,
    permits_per_second: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = elapsed.mul_add(self.permits_per_second, self.tokens).min(self.burst);
        self.last_refill = now;
    }

    /// `None` when the wait is too long to represent.
    fn next_permit_at(&self, now: Instant) -> Option<Instant> {
        let wait = (1.0 - self.tokens).max(0.0) / self.permits_per_second;
        Duration::try_from_secs_f64(wait)
            .ok()
            .and_then(|wait| now.checked_add(wait))
    }
}

/// A waitpoint that lets at most `permits_per_second` callers through per
/// second, with bursts of up to `burst` callers after an idle period.
///
/// ```
/// use prometheus_concurrency::core::{ThrottlingWaitpoint, Waitpoint};
///
/// let gate = ThrottlingWaitpoint::new(1000.0, 2).unwrap();
/// gate.pass().unwrap();
/// gate.pass().unwrap();
/// ```
pub struct ThrottlingWaitpoint {
    monitor: Arc<Monitor<Bucket>>,
}

impl ThrottlingWaitpoint {
    /// Create a throttle with a full bucket.
    ///
    /// # Errors
    ///
    /// [`SyncError::IllegalArgument`] if the rate is not a positive finite
    /// number or `burst` is zero.
    pub fn new(permits_per_second: f64, burst: u32) -> Result<Self, SyncError> {
        validate_rate(permits_per_second)?;
        if burst == 0 {
            return Err(SyncError::IllegalArgument("burst must be greater than 0".into()));
        }
        let burst = f64::from(burst);
        Ok(Self {
            monitor: Monitor::new(Bucket {
                tokens: burst,
                burst,
                permits_per_second,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Change the rate. Waiting passers re-evaluate their wait time.
    ///
    /// # Errors
    ///
    /// [`SyncError::IllegalArgument`] if the rate is not a positive finite number.
    pub fn set_rate(&self, permits_per_second: f64) -> Result<(), SyncError> {
        validate_rate(permits_per_second)?;
        let mut bucket = self.monitor.lock();
        bucket.refill(Instant::now());
        bucket.permits_per_second = permits_per_second;
        self.monitor.notify_all();
        debug!(permits_per_second, "throttle rate changed");
        Ok(())
    }

    /// Current rate in permits per second.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.monitor.lock().permits_per_second
    }

    fn acquire(&self, deadline: Option<Instant>) -> Result<(), SyncError> {
        let mut bucket = self.monitor.lock();
        loop {
            let now = Instant::now();
            bucket.refill(now);
            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return Ok(());
            }
            match (bucket.next_permit_at(now), deadline) {
                (Some(ready_at), Some(deadline)) if ready_at > deadline => {
                    return Err(SyncError::Timeout);
                }
                (None, Some(_)) => return Err(SyncError::Timeout),
                (Some(ready_at), _) => self.monitor.park_until(&mut bucket, ready_at)?,
                // Only a rate change or an interrupt ends this wait.
                (None, None) => {
                    let rate = bucket.permits_per_second.to_bits();
                    self.monitor.await_while(&mut bucket, None, |bucket| {
                        bucket.permits_per_second.to_bits() == rate
                    })?;
                }
            }
        }
    }
}

impl fmt::Debug for ThrottlingWaitpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bucket = self.monitor.lock();
        f.debug_struct("ThrottlingWaitpoint")
            .field("permits_per_second", &bucket.permits_per_second)
            .field("burst", &bucket.burst)
            .field("tokens", &bucket.tokens)
            .finish()
    }
}

fn validate_rate(permits_per_second: f64) -> Result<(), SyncError> {
    if permits_per_second.is_finite() && permits_per_second > 0.0 {
        Ok(())
    } else {
        Err(SyncError::IllegalArgument(format!(
            "permits_per_second must be positive, got {permits_per_second}"
        )))
    }
}

impl Waitpoint for ThrottlingWaitpoint {
    fn pass(&self) -> Result<(), SyncError> {
        self.acquire(None)
    }

    fn try_pass(&self, timeout: Duration) -> Result<Duration, SyncError> {
        let deadline = deadline_after(timeout);
        self.acquire(deadline)?;
        Ok(remaining_until(deadline, timeout))
    }

    fn is_passable(&self) -> bool {
        let mut bucket = self.monitor.lock();
        bucket.refill(Instant::now());
        bucket.tokens >= 1.0
    }
}
