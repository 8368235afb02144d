//! Observability metrics for Hi-Lo allocators.
//!
//! All metrics use lock-free atomics and are only touched on the refill path.

pub mod allocator;
pub mod histogram;

pub use allocator::AllocatorMetrics;
pub use histogram::Histogram;
