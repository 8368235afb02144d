//! Identifier composition for Hi-Lo blocks.

/// Default number of identifiers per reserved block.
pub const DEFAULT_CAPACITY: u64 = 16 * 1024;

/// Largest supported block size. Keeps the in-flight offset counter well
/// inside its 32-bit half of the allocator state word.
pub const MAX_CAPACITY: u64 = 1 << 31;

/// Combines a block number and an offset into a flat identifier.
///
/// `hi` starts at 1 and `lo` ranges over `1..=capacity`, so block `hi` covers
/// `(hi - 1) * capacity + 1 ..= hi * capacity`.
#[inline]
pub fn compose(hi: u64, lo: u64, capacity: u64) -> u64 {
    debug_assert!(hi >= 1, "block numbers start at 1");
    debug_assert!((1..=capacity).contains(&lo), "offset {} outside block", lo);
    (hi - 1) * capacity + lo
}
