use crate::contracts::error::HiLoError;

/// Mints unique 64-bit identifiers.
///
/// # Invariants
/// - No two calls on instances sharing a sequence key return the same value
/// - Lock-free in the hot path
pub trait IdGenerator: Send + Sync {
    /// Returns the next identifier.
    fn next_id(&self) -> Result<u64, HiLoError>;
}
