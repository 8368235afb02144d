use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::allocator::compose::compose;
use crate::allocator::config::AllocatorConfig;
use crate::allocator::refill::BlockReserver;
use crate::contracts::{HiLoError, IdGenerator, LockResultExt, SequenceStore};
use crate::metrics::AllocatorMetrics;

const LO_BITS: u32 = 32;
const LO_MASK: u64 = (1 << LO_BITS) - 1;

/// Largest block number the allocator can hold in its state word.
pub const MAX_BLOCK: u64 = u32::MAX as u64;

/// Packs the current block and offset into one word so that every offset
/// claimed by `fetch_add` comes paired with the block it belongs to.
#[inline]
fn pack(hi: u64, lo: u64) -> u64 {
    (hi << LO_BITS) | lo
}

#[inline]
fn unpack(state: u64) -> (u64, u64) {
    (state >> LO_BITS, state & LO_MASK)
}

/// Hi-Lo identifier allocator for one logical sequence.
///
/// The hot path is a single `fetch_add` on the state word. When the offset
/// runs past `capacity`, callers queue on the gate; the first one in reserves
/// a new block from the store and the rest retry against it.
///
/// # Invariants
/// - Offsets in `1..=capacity` are issued at most once per block
/// - The state word is only overwritten while holding the gate
/// - A failed refill leaves the block exhausted, so the next call refills again
/// - The offset half never nears `LO_MASK`: it is reset under the gate after
///   every refill attempt and only grows by one per waiting caller meanwhile
pub struct HiLoAllocator<S: ?Sized> {
    /// `current_hi` in the upper half, `current_lo` in the lower half
    state: AtomicU64,
    capacity: u64,
    gate: Mutex<()>,
    reserver: BlockReserver<S>,
    metrics: Arc<AllocatorMetrics>,
}

impl<S> HiLoAllocator<S>
where
    S: SequenceStore + ?Sized,
{
    /// Creates an allocator bound to `config.key`. No store access happens
    /// until the first identifier is requested.
    pub fn new(store: Arc<S>, config: AllocatorConfig) -> Result<Self, HiLoError> {
        config.validate()?;
        let metrics = Arc::new(AllocatorMetrics::new(config.key.as_str()));

        Ok(Self {
            state: AtomicU64::new(pack(0, config.capacity + 1)),
            capacity: config.capacity,
            gate: Mutex::new(()),
            reserver: BlockReserver::new(store, config.key, config.retry, Arc::clone(&metrics)),
            metrics,
        })
    }

    /// Returns the next identifier of this sequence.
    pub fn next_id(&self) -> Result<u64, HiLoError> {
        loop {
            // AcqRel pairs with the Release store of a refill
            let (hi, lo) = unpack(self.state.fetch_add(1, Ordering::AcqRel).wrapping_add(1));
            if lo <= self.capacity {
                return Ok(compose(hi, lo, self.capacity));
            }
            if let Some(id) = self.refill()? {
                return Ok(id);
            }
        }
    }

    /// Reserves a new block unless another caller already did.
    ///
    /// Returns `None` when the block was refilled while waiting on the gate;
    /// the caller must claim a fresh offset instead of reusing its stale one.
    fn refill(&self) -> Result<Option<u64>, HiLoError> {
        let _gate = self.gate.lock().map_lock_err::<HiLoError>()?;

        let (current_hi, lo) = unpack(self.state.load(Ordering::Acquire));
        if lo <= self.capacity {
            return Ok(None);
        }

        let exhausted = pack(current_hi, self.capacity + 1);
        match self.reserver.reserve_next_block() {
            Ok(hi) if (1..=MAX_BLOCK).contains(&hi) => {
                self.state.store(pack(hi, 1), Ordering::Release);
                Ok(Some(compose(hi, 1, self.capacity)))
            }
            Ok(hi) => {
                self.state.store(exhausted, Ordering::Release);
                Err(HiLoError::BlockOverflow { hi })
            }
            Err(e) => {
                self.state.store(exhausted, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Identifiers per block.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Backing-store key of this sequence.
    pub fn key(&self) -> &str {
        self.reserver.key()
    }

    /// Block currently in use, `None` before the first reservation.
    pub fn current_block(&self) -> Option<u64> {
        match unpack(self.state.load(Ordering::Acquire)).0 {
            0 => None,
            hi => Some(hi),
        }
    }

    pub fn metrics(&self) -> &Arc<AllocatorMetrics> {
        &self.metrics
    }
}

impl<S> IdGenerator for HiLoAllocator<S>
where
    S: SequenceStore + ?Sized,
{
    fn next_id(&self) -> Result<u64, HiLoError> {
        HiLoAllocator::next_id(self)
    }
}
