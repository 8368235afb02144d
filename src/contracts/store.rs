use serde::{Deserialize, Serialize};

use crate::contracts::error::StoreError;

/// Persisted state of one logical sequence.
///
/// Wire shape is `{"next_hi": <u64>}`. The version token lives beside the
/// payload as store metadata and is never serialized into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    /// Block number handed to the next reservation request.
    pub next_hi: u64,
}

impl SequenceRecord {
    /// Record written by the first reservation; block 1 belongs to its writer.
    pub const INITIAL: SequenceRecord = SequenceRecord { next_hi: 2 };

    /// Encodes the record as JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a record from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Opaque, store-managed version of a record. Changes on every successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionToken(pub u64);

/// A record together with the version it was read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionedRecord {
    pub record: SequenceRecord,
    pub version: VersionToken,
}

/// Versioned single-record store backing block reservation.
///
/// # Invariants
/// - A `put` conditioned on a stale token never succeeds
/// - A `create` never overwrites an existing record
/// - Every successful write yields a token distinct from all earlier tokens
///   for the same key
pub trait SequenceStore: Send + Sync {
    /// Reads the record stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<VersionedRecord>, StoreError>;

    /// Creates the record only if `key` has no record yet.
    /// Fails with `StoreError::AlreadyExists` otherwise.
    fn create(&self, key: &str, record: &SequenceRecord) -> Result<VersionToken, StoreError>;

    /// Replaces the record if its current version equals `expected`.
    /// Fails with `StoreError::Conflict` when the version moved on or the
    /// record is missing.
    fn put(
        &self,
        key: &str,
        expected: VersionToken,
        record: &SequenceRecord,
    ) -> Result<VersionToken, StoreError>;
}
