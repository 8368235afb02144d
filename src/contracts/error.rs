use std::sync::{MutexGuard, PoisonError};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HiLoError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Gave up reserving a block for {key} after {attempts} conflicting attempts")]
    ConflictRetriesExhausted { key: String, attempts: usize },

    #[error("Block number {hi} is outside the allocatable range")]
    BlockOverflow { hi: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Extension trait for converting mutex poisoning into a crate error.
pub trait LockResultExt<T> {
    /// Converts a lock error into `E`.
    fn map_lock_err<E: From<PoisonedLock>>(self) -> Result<T, E>;
}

/// Carrier for a poisoned lock message, convertible into either error type.
#[derive(Debug)]
pub struct PoisonedLock(pub String);

impl From<PoisonedLock> for StoreError {
    fn from(p: PoisonedLock) -> Self {
        StoreError::LockPoisoned(p.0)
    }
}

impl From<PoisonedLock> for HiLoError {
    fn from(p: PoisonedLock) -> Self {
        HiLoError::LockPoisoned(p.0)
    }
}

impl<'a, T> LockResultExt<MutexGuard<'a, T>>
    for Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err<E: From<PoisonedLock>>(self) -> Result<MutexGuard<'a, T>, E> {
        self.map_err(|e| PoisonedLock(e.to_string()).into())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Version conflict on {key}")]
    Conflict { key: String },

    #[error("Record already exists: {key}")]
    AlreadyExists { key: String },

    #[error("RocksDB error: {0}")]
    RocksDb(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Returns true for optimistic-concurrency failures that a reader should
    /// resolve by re-reading the record.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::AlreadyExists { .. }
        )
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn conflict_variants_are_classified() {
        assert!(StoreError::Conflict { key: "k".into() }.is_conflict());
        assert!(StoreError::AlreadyExists { key: "k".into() }.is_conflict());
        assert!(!StoreError::Io("disk".into()).is_conflict());
        assert!(!StoreError::Unavailable("down".into()).is_conflict());
    }

    #[test]
    fn io_error_maps_to_store_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(ref msg) if msg.contains("denied")));
        assert!(!err.is_conflict());
    }

    #[test]
    fn store_error_converts_into_hilo_error() {
        let err: HiLoError = StoreError::RocksDb("boom".into()).into();
        assert!(matches!(err, HiLoError::Store(StoreError::RocksDb(_))));
        assert_eq!(err.to_string(), "Store error: RocksDB error: boom");
    }

    #[test]
    fn poisoned_mutex_maps_to_lock_error() {
        let mutex = Arc::new(Mutex::new(0u64));
        let poisoner = Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let result: Result<_, HiLoError> = mutex.lock().map_lock_err();
        assert!(matches!(result, Err(HiLoError::LockPoisoned(_))));
    }
}
