use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, SendError, SendTimeoutError, Sender};
use tracing::{trace, warn};

use crate::core::monitor::{deadline_after, Monitor};
use crate::core::SyncError;

struct Turn {
    expected: u64,
    /// The producer holding `expected` is sending with the lock released.
    committing: bool,
}

/// Resequencer that orders producers rather than items.
///
/// A producer draws an id with [`next_sequence_id`](Self::next_sequence_id)
/// before starting its work and hands the result to [`put`](Self::put), which
/// waits until every lower id has been committed. Items therefore reach the
/// downstream queue in id order no matter which producer finishes first.
///
/// Once a producer's turn has come, its send cannot be interrupted: `put`
/// waits for the consumer to make room, `try_put` waits until its timeout.
/// The send happens outside the turn lock, so interrupting or timing out the
/// other producers never waits on a full queue.
///
/// ```
/// use prometheus_concurrency::core::SimpleResequencer;
/// use std::thread;
///
/// let (resequencer, downstream) = SimpleResequencer::new(4).unwrap();
/// let first = resequencer.next_sequence_id();
/// let second = resequencer.next_sequence_id();
///
/// thread::scope(|scope| {
///     scope.spawn(|| resequencer.put(second, "second").unwrap());
///     scope.spawn(|| resequencer.put(first, "first").unwrap());
/// });
///
/// assert_eq!(downstream.recv().unwrap(), "first");
/// assert_eq!(downstream.recv().unwrap(), "second");
/// ```
pub struct SimpleResequencer<E> {
    issued: AtomicU64,
    turn: Arc<Monitor<Turn>>,
    downstream: Sender<E>,
}

impl<E: Send> SimpleResequencer<E> {
    /// Create a resequencer feeding a bounded queue of `capacity` items.
    /// Returns the consumer end of the queue.
    ///
    /// # Errors
    ///
    /// `SyncError::IllegalArgument` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<(Self, Receiver<E>), SyncError> {
        if capacity == 0 {
            return Err(SyncError::IllegalArgument(
                "downstream capacity must be greater than 0".into(),
            ));
        }
        let (downstream, receiver) = bounded(capacity);
        Ok((
            Self {
                issued: AtomicU64::new(0),
                turn: Monitor::new(Turn {
                    expected: 0,
                    committing: false,
                }),
                downstream,
            },
            receiver,
        ))
    }

    /// Issue the next id. Ids start at 0 and increase by one per call.
    pub fn next_sequence_id(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst)
    }

    /// The id whose item will be committed next.
    #[must_use]
    pub fn expected_id(&self) -> u64 {
        self.turn.lock().expected
    }

    /// Wait for `id`'s turn, then send `item` downstream.
    ///
    /// # Errors
    ///
    /// - `SyncError::IllegalArgument` if `id` was never issued or is already committed
    /// - `SyncError::Interrupted` if the thread is interrupted before its turn; nothing is committed
    /// - `SyncError::Rejected` if the receiver is gone; the id still counts as committed
    pub fn put(&self, id: u64, item: E) -> Result<(), SyncError> {
        self.commit(id, item, None)
    }

    /// Bounded [`put`](Self::put). The timeout covers both the wait for the
    /// turn and the send into a full queue. On `SyncError::Timeout` the item is
    /// dropped, nothing is committed and the id is still owed: put it again.
    ///
    /// # Errors
    ///
    /// As `put`, plus `SyncError::Timeout`.
    pub fn try_put(&self, id: u64, item: E, timeout: Duration) -> Result<(), SyncError> {
        self.commit(id, item, deadline_after(timeout))
    }

    fn commit(&self, id: u64, item: E, deadline: Option<Instant>) -> Result<(), SyncError> {
        if id >= self.issued.load(Ordering::SeqCst) {
            return Err(SyncError::IllegalArgument(format!(
                "sequence id {id} was never issued"
            )));
        }

        let mut turn = self.turn.lock();
        self.turn
            .await_while(&mut turn, deadline, |turn| turn.expected < id)?;
        if turn.expected != id || turn.committing {
            return Err(SyncError::IllegalArgument(format!(
                "sequence id {id} already committed (expecting {})",
                turn.expected
            )));
        }
        turn.committing = true;
        drop(turn);

        let sent = match deadline {
            None => self
                .downstream
                .send(item)
                .map_err(|SendError(item)| SendTimeoutError::Disconnected(item)),
            Some(deadline) => self.downstream.send_deadline(item, deadline),
        };

        let mut turn = self.turn.lock();
        turn.committing = false;
        if matches!(sent, Err(SendTimeoutError::Timeout(_))) {
            drop(turn);
            trace!(id, "downstream full, commit timed out");
            return Err(SyncError::Timeout);
        }
        turn.expected += 1;
        self.turn.notify_all();
        drop(turn);

        match sent {
            Ok(()) => {
                trace!(id, "item committed");
                Ok(())
            }
            Err(_) => {
                warn!(id, "downstream receiver dropped, item discarded");
                Err(SyncError::Rejected("downstream queue disconnected".into()))
            }
        }
    }
}

impl<E> fmt::Debug for SimpleResequencer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleResequencer")
            .field("issued", &self.issued.load(Ordering::Relaxed))
            .field("expected", &self.turn.lock().expected)
            .field("queued", &self.downstream.len())
            .finish()
    }
}
