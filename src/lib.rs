pub mod allocator;
pub mod contracts;
pub mod metrics;
pub mod storage;

pub use allocator::{AllocatorConfig, HiLoAllocator, HiLoRegistry, RetryConfig};
pub use contracts::{HiLoError, IdGenerator, SequenceStore, StoreError};
