//! Restore index order to items produced concurrently.
//!
//! - [`ResequenceProcess`] buffers out-of-order items and hands back each
//!   contiguous run as soon as it is complete. It never blocks.
//! - [`SimpleResequencer`] makes producers wait for their turn instead, so
//!   items reach a bounded downstream queue in issued-id order.

mod blocking;
mod buffering;

pub use blocking::SimpleResequencer;
pub use buffering::{ResequenceProcess, Resequenced};

/// Item that may carry a sequence index.
pub trait Sequenced {
    /// Position in the stream, or `None` if the item is not ordered and
    /// should pass straight through.
    fn sequence_index(&self) -> Option<u64>;
}

impl<T> Sequenced for (u64, T) {
    fn sequence_index(&self) -> Option<u64> {
        Some(self.0)
    }
}

impl<T: Sequenced> Sequenced for Box<T> {
    fn sequence_index(&self) -> Option<u64> {
        (**self).sequence_index()
    }
}
