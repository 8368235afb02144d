//! Hi-Lo identifier allocation.
//!
//! [`HiLoAllocator`] hands out identifiers from an in-memory block and
//! reserves the next block from a [`SequenceStore`](crate::contracts::SequenceStore)
//! only when the current one is used up.

mod compose;
mod config;
mod hilo;
mod refill;
mod registry;
mod retry;

pub use compose::{compose, DEFAULT_CAPACITY, MAX_CAPACITY};
pub use config::{AllocatorConfig, DEFAULT_SEQUENCE_KEY};
pub use hilo::{HiLoAllocator, MAX_BLOCK};
pub use registry::HiLoRegistry;
pub use retry::RetryConfig;
