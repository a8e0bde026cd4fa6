//! Concurrency primitives: waitpoints, lendable references, the resizable
//! thread pool, the repeater service and resequencers.

pub mod error;
pub mod handler;
pub mod interrupt;
pub mod lendable;
mod monitor;
pub mod repeater;
pub mod resequencer;
pub mod thread_pool;
pub mod waitpoint;

pub use error::{AppResult, SyncError};
pub use handler::{default_handler, ExceptionHandler, NoOpExceptionHandler, TracingExceptionHandler};
pub use interrupt::{interrupted, InterruptHandle};
pub use lendable::{
    lendable_reference, LendableReference, LendingMode, RelaxedLendableReference,
    StrictLendableReference, WaitpointLendableReference,
};
pub use repeater::{repeatable, Repeatable, RepeatableRef, RepeaterService, RepeaterState};
pub use resequencer::{ResequenceProcess, Resequenced, Sequenced, SimpleResequencer};
pub use thread_pool::{ThreadPool, ThreadPoolState, ThreadPoolStats, WorkerJob};
pub use waitpoint::{AllOfWaitpoint, CloseableWaitpoint, ThrottlingWaitpoint, Waitpoint};
