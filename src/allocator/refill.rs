//! Block reservation against the sequence store.

use std::sync::Arc;
use std::time::Instant;

use backon::BlockingRetryable;

use crate::allocator::retry::RetryConfig;
use crate::contracts::{HiLoError, SequenceRecord, SequenceStore};
use crate::metrics::AllocatorMetrics;

/// Reserves Hi block numbers for one sequence key.
///
/// Every successful reservation advances `next_hi` by exactly one through a
/// conditional write, so a block number is handed out at most once across all
/// reservers sharing the key.
pub(crate) struct BlockReserver<S: ?Sized> {
    store: Arc<S>,
    key: String,
    retry: RetryConfig,
    metrics: Arc<AllocatorMetrics>,
}

impl<S> BlockReserver<S>
where
    S: SequenceStore + ?Sized,
{
    pub(crate) fn new(
        store: Arc<S>,
        key: String,
        retry: RetryConfig,
        metrics: Arc<AllocatorMetrics>,
    ) -> Self {
        Self {
            store,
            key,
            retry,
            metrics,
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Reserves the next free block, retrying on version conflicts.
    ///
    /// Store errors other than conflicts are returned as-is.
    pub(crate) fn reserve_next_block(&self) -> Result<u64, HiLoError> {
        let started = Instant::now();
        let mut attempts = 0usize;

        let result = (|| {
            attempts += 1;
            self.try_reserve()
        })
        .retry(self.retry.backoff())
        .sleep(std::thread::sleep)
        .when(|e| {
            let conflict = is_conflict(e);
            if conflict {
                self.metrics.record_conflict();
            }
            conflict
        })
        .notify(|_, delay| {
            tracing::debug!(
                key = %self.key,
                retry_in = ?delay,
                "Block reservation conflicted, retrying"
            );
        })
        .call();

        match result {
            Ok(hi) => {
                self.metrics.record_block_reserved(elapsed_us(started));
                tracing::debug!(key = %self.key, hi, attempts, "Reserved block");
                Ok(hi)
            }
            Err(e) if is_conflict(&e) => {
                self.metrics.record_refill_failure(elapsed_us(started));
                tracing::error!(key = %self.key, attempts, "Block reservation kept conflicting");
                Err(HiLoError::ConflictRetriesExhausted {
                    key: self.key.clone(),
                    attempts,
                })
            }
            Err(e) => {
                self.metrics.record_refill_failure(elapsed_us(started));
                tracing::error!(key = %self.key, error = %e, "Block reservation failed");
                Err(e)
            }
        }
    }

    /// One read-then-conditional-write round.
    fn try_reserve(&self) -> Result<u64, HiLoError> {
        match self.store.get(&self.key)? {
            None => {
                self.store.create(&self.key, &SequenceRecord::INITIAL)?;
                Ok(1)
            }
            Some(current) => {
                let reserved = current.record.next_hi;
                let next_hi = reserved
                    .checked_add(1)
                    .ok_or(HiLoError::BlockOverflow { hi: reserved })?;
                self.store
                    .put(&self.key, current.version, &SequenceRecord { next_hi })?;
                Ok(reserved)
            }
        }
    }
}

fn is_conflict(e: &HiLoError) -> bool {
    matches!(e, HiLoError::Store(store) if store.is_conflict())
}

/// Microseconds since `started`, saturating at `u64::MAX`.
fn elapsed_us(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{StoreError, VersionToken, VersionedRecord};
    use crate::storage::InMemorySequenceStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEY: &str = "seq";

    fn reserver<S: SequenceStore + ?Sized>(store: Arc<S>, retry: RetryConfig) -> BlockReserver<S> {
        BlockReserver::new(
            store,
            KEY.to_string(),
            retry,
            Arc::new(AllocatorMetrics::new(KEY)),
        )
    }

    /// Lets another reserver win the race right before each of the first
    /// `interleave` puts.
    struct RacingStore {
        inner: InMemorySequenceStore,
        interleave: AtomicUsize,
    }

    impl SequenceStore for RacingStore {
        fn get(&self, key: &str) -> Result<Option<VersionedRecord>, StoreError> {
            self.inner.get(key)
        }

        fn create(&self, key: &str, record: &SequenceRecord) -> Result<VersionToken, StoreError> {
            self.inner.create(key, record)
        }

        fn put(
            &self,
            key: &str,
            expected: VersionToken,
            record: &SequenceRecord,
        ) -> Result<VersionToken, StoreError> {
            let race = self
                .interleave
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if race {
                let current = self.inner.get(key)?.ok_or(StoreError::Conflict {
                    key: key.to_string(),
                })?;
                self.inner.put(
                    key,
                    current.version,
                    &SequenceRecord {
                        next_hi: current.record.next_hi + 1,
                    },
                )?;
            }
            self.inner.put(key, expected, record)
        }
    }

    #[test]
    fn empty_store_grants_block_one() {
        let store = Arc::new(InMemorySequenceStore::new());
        let reserver = reserver(Arc::clone(&store), RetryConfig::default());

        assert_eq!(reserver.reserve_next_block().unwrap(), 1);
        assert_eq!(store.get(KEY).unwrap().unwrap().record.next_hi, 2);
        assert_eq!(store.creates(), 1);
    }

    #[test]
    fn existing_record_grants_its_next_hi() {
        let store =
            Arc::new(InMemorySequenceStore::with_record(KEY, SequenceRecord { next_hi: 10 }).unwrap());
        let reserver = reserver(Arc::clone(&store), RetryConfig::default());

        assert_eq!(reserver.reserve_next_block().unwrap(), 10);
        assert_eq!(store.get(KEY).unwrap().unwrap().record.next_hi, 11);
    }

    #[test]
    fn consecutive_reservations_are_strictly_increasing() {
        let store = Arc::new(InMemorySequenceStore::new());
        let reserver = reserver(Arc::clone(&store), RetryConfig::default());

        let blocks: Vec<u64> = (0..5).map(|_| reserver.reserve_next_block().unwrap()).collect();
        assert_eq!(blocks, vec![1, 2, 3, 4, 5]);
        assert_eq!(store.get(KEY).unwrap().unwrap().record.next_hi, 6);
    }

    #[test]
    fn conflict_rereads_and_takes_the_following_block() {
        let store = Arc::new(RacingStore {
            inner: InMemorySequenceStore::with_record(KEY, SequenceRecord { next_hi: 5 }).unwrap(),
            interleave: AtomicUsize::new(1),
        });
        let reserver = reserver(Arc::clone(&store), RetryConfig::unbounded_immediate());

        // The racer took block 5 first.
        assert_eq!(reserver.reserve_next_block().unwrap(), 6);
        assert_eq!(store.inner.get(KEY).unwrap().unwrap().record.next_hi, 7);
        assert_eq!(reserver.metrics.conflicts(), 1);
        assert_eq!(reserver.metrics.blocks_reserved(), 1);
    }

    #[test]
    fn elapsed_time_is_reported_in_micros() {
        let started = Instant::now() - std::time::Duration::from_millis(2);
        let us = elapsed_us(started);
        assert!(us >= 2_000);
        assert!(us < u64::MAX);
    }

    #[test]
    fn bounded_retry_gives_up_after_max_conflicts() {
        let store = Arc::new(RacingStore {
            inner: InMemorySequenceStore::with_record(KEY, SequenceRecord { next_hi: 5 }).unwrap(),
            interleave: AtomicUsize::new(usize::MAX),
        });
        let retry = RetryConfig {
            max_conflict_retries: Some(2),
            initial_delay_ms: 0,
            max_delay_ms: 0,
        };
        let reserver = reserver(store, retry);

        let err = reserver.reserve_next_block().unwrap_err();
        assert!(matches!(
            err,
            HiLoError::ConflictRetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(reserver.metrics.conflicts(), 3);
        assert_eq!(reserver.metrics.refill_failures(), 1);
    }

    #[test]
    fn lost_create_race_falls_back_to_conditional_put() {
        // Record appears between our read and our create.
        struct LateCreateStore {
            inner: InMemorySequenceStore,
            hidden_once: AtomicUsize,
        }

        impl SequenceStore for LateCreateStore {
            fn get(&self, key: &str) -> Result<Option<VersionedRecord>, StoreError> {
                if self
                    .hidden_once
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Ok(None);
                }
                self.inner.get(key)
            }

            fn create(
                &self,
                key: &str,
                record: &SequenceRecord,
            ) -> Result<VersionToken, StoreError> {
                self.inner.create(key, record)
            }

            fn put(
                &self,
                key: &str,
                expected: VersionToken,
                record: &SequenceRecord,
            ) -> Result<VersionToken, StoreError> {
                self.inner.put(key, expected, record)
            }
        }

        let store = Arc::new(LateCreateStore {
            inner: InMemorySequenceStore::with_record(KEY, SequenceRecord::INITIAL).unwrap(),
            hidden_once: AtomicUsize::new(1),
        });
        let reserver = reserver(Arc::clone(&store), RetryConfig::unbounded_immediate());

        assert_eq!(reserver.reserve_next_block().unwrap(), 2);
        assert_eq!(store.inner.get(KEY).unwrap().unwrap().record.next_hi, 3);
        assert_eq!(reserver.metrics.conflicts(), 1);
    }

    #[test]
    fn store_failure_is_not_retried() {
        let store = Arc::new(InMemorySequenceStore::new());
        store.fail_next(1);
        let reserver = reserver(Arc::clone(&store), RetryConfig::default());

        let err = reserver.reserve_next_block().unwrap_err();
        assert!(matches!(err, HiLoError::Store(StoreError::Unavailable(_))));
        assert_eq!(store.reads(), 0);
        assert_eq!(reserver.metrics.refill_failures(), 1);

        assert_eq!(reserver.reserve_next_block().unwrap(), 1);
    }

    #[test]
    fn exhausted_block_space_is_reported() {
        let store = Arc::new(
            InMemorySequenceStore::with_record(KEY, SequenceRecord { next_hi: u64::MAX }).unwrap(),
        );
        let reserver = reserver(store, RetryConfig::default());

        assert!(matches!(
            reserver.reserve_next_block(),
            Err(HiLoError::BlockOverflow { hi: u64::MAX })
        ));
    }
}
