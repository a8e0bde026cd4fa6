use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;
use tracing::trace;

use crate::core::SyncError;

use super::Sequenced;

/// Outcome of [`ResequenceProcess::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resequenced<E> {
    /// The item completed a run; items are in index order.
    Ready(Vec<E>),
    /// The item is held until the gap before it is filled.
    Buffered,
    /// The item has no index and was not touched.
    Unsequenced(E),
}

impl<E> Resequenced<E> {
    /// Items to forward downstream now, in order.
    #[must_use]
    pub fn into_items(self) -> Vec<E> {
        match self {
            Self::Ready(run) => run,
            Self::Buffered => Vec::new(),
            Self::Unsequenced(item) => vec![item],
        }
    }

    /// True when the item was held back.
    #[must_use]
    pub const fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered)
    }
}

struct State<E> {
    first: u64,
    last_returned: Option<u64>,
    pending: BTreeMap<u64, E>,
}

impl<E> State<E> {
    /// `None` once `u64::MAX` has been emitted.
    fn next_expected(&self) -> Option<u64> {
        match self.last_returned {
            None => Some(self.first),
            Some(last) => last.checked_add(1),
        }
    }
}

/// Non-blocking reorder buffer.
///
/// ```
/// use prometheus_concurrency::core::{ResequenceProcess, Resequenced};
///
/// let process = ResequenceProcess::new(8);
/// assert!(process.receive((1_u64, "b")).unwrap().is_buffered());
/// assert_eq!(
///     process.receive((0_u64, "a")).unwrap(),
///     Resequenced::Ready(vec![(0, "a"), (1, "b")])
/// );
/// assert_eq!(process.last_returned(), Some(1));
/// ```
pub struct ResequenceProcess<E> {
    capacity: usize,
    state: Mutex<State<E>>,
}

impl<E: Sequenced> ResequenceProcess<E> {
    /// Buffer holding up to `capacity` out-of-order items; indices start at 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::starting_at(0, capacity)
    }

    /// Like [`new`](Self::new) with the first expected index set to `first`.
    #[must_use]
    pub fn starting_at(first: u64, capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State {
                first,
                last_returned: None,
                pending: BTreeMap::new(),
            }),
        }
    }

    /// Accept one item.
    ///
    /// # Errors
    ///
    /// - `SyncError::DuplicateSequence` if the index was already emitted or is already buffered
    /// - `SyncError::CapacityExceeded` if the item would have to be buffered and the buffer is full
    ///
    /// A rejected item leaves the buffer unchanged.
    pub fn receive(&self, item: E) -> Result<Resequenced<E>, SyncError> {
        let Some(index) = item.sequence_index() else {
            return Ok(Resequenced::Unsequenced(item));
        };

        let mut state = self.state.lock();
        let duplicate = |state: &State<E>| SyncError::DuplicateSequence {
            index,
            watermark: state.last_returned,
        };
        let Some(expected) = state.next_expected() else {
            return Err(duplicate(&*state));
        };
        if index < expected {
            return Err(duplicate(&*state));
        }

        if index == expected {
            let mut run = vec![item];
            let mut last = index;
            while let Some(next) = last.checked_add(1) {
                match state.pending.remove(&next) {
                    Some(buffered) => {
                        run.push(buffered);
                        last = next;
                    }
                    None => break,
                }
            }
            state.last_returned = Some(last);
            trace!(from = index, to = last, buffered = state.pending.len(), "run released");
            return Ok(Resequenced::Ready(run));
        }

        if state.pending.len() >= self.capacity {
            return Err(SyncError::CapacityExceeded(state.pending.len()));
        }
        if state.pending.contains_key(&index) {
            return Err(duplicate(&*state));
        }
        state.pending.insert(index, item);
        trace!(index, expected, buffered = state.pending.len(), "item buffered");
        Ok(Resequenced::Buffered)
    }
}

impl<E> ResequenceProcess<E> {
    /// Highest index emitted so far.
    #[must_use]
    pub fn last_returned(&self) -> Option<u64> {
        self.state.lock().last_returned
    }

    /// Items waiting for a gap to fill.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Maximum number of buffered items.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<E> fmt::Debug for ResequenceProcess<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResequenceProcess")
            .field("capacity", &self.capacity)
            .field("last_returned", &state.last_returned)
            .field("buffered", &state.pending.len())
            .finish()
    }
}
