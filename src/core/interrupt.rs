//! Cooperative thread interruption.
//!
//! Every thread owns an [`InterruptHandle`]. Blocking calls in this crate
//! register the primitive they are parked on with the calling thread's handle,
//! so [`InterruptHandle::interrupt`] can wake them. An interrupted wait returns
//! [`SyncError::Interrupted`](crate::core::SyncError::Interrupted) and clears
//! the flag.
//!
//! ```
//! use prometheus_concurrency::core::{CloseableWaitpoint, InterruptHandle, SyncError, Waitpoint};
//! use std::sync::{mpsc, Arc};
//! use std::thread;
//!
//! let gate = Arc::new(CloseableWaitpoint::new(false));
//! let (tx, rx) = mpsc::channel();
//! let waiter = {
//!     let gate = Arc::clone(&gate);
//!     thread::spawn(move || {
//!         tx.send(InterruptHandle::current()).unwrap();
//!         gate.pass()
//!     })
//! };
//!
//! rx.recv().unwrap().interrupt();
//! assert_eq!(waiter.join().unwrap(), Err(SyncError::Interrupted));
//! ```

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Something a blocked thread can be woken from.
pub(crate) trait Wake: Send + Sync {
    /// Wake every thread parked on this primitive.
    fn wake(&self);
}

struct InterruptState {
    raised: AtomicBool,
    parked_on: Mutex<Option<Arc<dyn Wake>>>,
}

/// Handle used to interrupt one thread.
#[derive(Clone)]
pub struct InterruptHandle {
    state: Arc<InterruptState>,
}

thread_local! {
    static CURRENT: RefCell<Option<InterruptHandle>> = const { RefCell::new(None) };
}

impl InterruptHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(InterruptState {
                raised: AtomicBool::new(false),
                parked_on: Mutex::new(None),
            }),
        }
    }

    /// Handle of the calling thread.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(|current| current.borrow_mut().get_or_insert_with(Self::new).clone())
    }

    /// Make `self` the calling thread's handle. Used by pool workers, whose
    /// handles are created before the thread starts.
    pub(crate) fn install(self) {
        CURRENT.with(|current| *current.borrow_mut() = Some(self));
    }

    /// Interrupt the thread: raise its flag and wake it if it is parked.
    pub fn interrupt(&self) {
        self.raise();
        self.wake();
    }

    /// Whether the flag is raised. Does not clear it.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.state.raised.load(Ordering::SeqCst)
    }

    /// Raise the flag without waking. Pair with [`Self::wake`] once any
    /// locks the parked primitive might need are released.
    pub(crate) fn raise(&self) {
        self.state.raised.store(true, Ordering::SeqCst);
    }

    pub(crate) fn wake(&self) {
        // Clone out so the primitive's lock is never taken under ours.
        let parked_on = self.state.parked_on.lock().clone();
        if let Some(primitive) = parked_on {
            primitive.wake();
        }
    }

    /// Test and clear the flag.
    pub(crate) fn take_raised(&self) -> bool {
        self.state.raised.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn park_on(&self, primitive: Arc<dyn Wake>) -> Parked<'_> {
        *self.state.parked_on.lock() = Some(primitive);
        Parked { handle: self }
    }
}

impl fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptHandle")
            .field("raised", &self.is_interrupted())
            .finish_non_exhaustive()
    }
}

/// Registration of a parked thread; cleared on drop.
pub(crate) struct Parked<'a> {
    handle: &'a InterruptHandle,
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        *self.handle.state.parked_on.lock() = None;
    }
}

/// Test and clear the calling thread's interrupt flag.
pub fn interrupted() -> bool {
    InterruptHandle::current().take_raised()
}
