use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::contracts::{SequenceRecord, SequenceStore, StoreError, VersionToken, VersionedRecord};

struct StoredRecord {
    payload: Vec<u8>,
    version: u64,
}

/// In-memory sequence store.
///
/// Conditional writes are atomic per key: the DashMap entry holds its shard
/// lock for the whole compare-and-swap. Payloads go through the same JSON
/// encoding as the persistent store.
pub struct InMemorySequenceStore {
    records: DashMap<String, StoredRecord>,
    /// Last version handed out, shared across keys
    version_counter: AtomicU64,
    /// Remaining operations to fail with `StoreError::Unavailable`
    failures_remaining: AtomicUsize,
    reads: AtomicU64,
    creates: AtomicU64,
    puts: AtomicU64,
}

impl InMemorySequenceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            version_counter: AtomicU64::new(0),
            failures_remaining: AtomicUsize::new(0),
            reads: AtomicU64::new(0),
            creates: AtomicU64::new(0),
            puts: AtomicU64::new(0),
        }
    }

    /// Creates a store already holding `record` under `key`.
    pub fn with_record(key: &str, record: SequenceRecord) -> Result<Self, StoreError> {
        let store = Self::new();
        store.create(key, &record)?;
        store.creates.store(0, Ordering::Relaxed);
        Ok(store)
    }

    /// Makes the next `count` operations fail as if the store were down.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of `get` calls that reached the store.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of successful `create` calls.
    pub fn creates(&self) -> u64 {
        self.creates.load(Ordering::Relaxed)
    }

    /// Number of successful `put` calls.
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    fn next_version(&self) -> u64 {
        self.version_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn check_available(&self, op: &str) -> Result<(), StoreError> {
        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable(format!("injected failure on {}", op)));
        }
        Ok(())
    }
}

impl Default for InMemorySequenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceStore for InMemorySequenceStore {
    fn get(&self, key: &str) -> Result<Option<VersionedRecord>, StoreError> {
        self.check_available("get")?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        match self.records.get(key) {
            Some(stored) => Ok(Some(VersionedRecord {
                record: SequenceRecord::from_json(&stored.payload)?,
                version: VersionToken(stored.version),
            })),
            None => Ok(None),
        }
    }

    fn create(&self, key: &str, record: &SequenceRecord) -> Result<VersionToken, StoreError> {
        self.check_available("create")?;
        let payload = record.to_json()?;

        match self.records.entry(key.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                key: key.to_string(),
            }),
            Entry::Vacant(slot) => {
                let version = self.next_version();
                slot.insert(StoredRecord { payload, version });
                self.creates.fetch_add(1, Ordering::Relaxed);
                Ok(VersionToken(version))
            }
        }
    }

    fn put(
        &self,
        key: &str,
        expected: VersionToken,
        record: &SequenceRecord,
    ) -> Result<VersionToken, StoreError> {
        self.check_available("put")?;
        let payload = record.to_json()?;

        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut slot) if slot.get().version == expected.0 => {
                let version = self.next_version();
                slot.insert(StoredRecord { payload, version });
                self.puts.fetch_add(1, Ordering::Relaxed);
                Ok(VersionToken(version))
            }
            _ => Err(StoreError::Conflict {
                key: key.to_string(),
            }),
        }
    }
}
