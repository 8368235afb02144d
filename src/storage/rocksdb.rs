use std::path::Path;
use std::sync::Mutex;

use rocksdb::{BlockBasedOptions, Options, WriteOptions, DB};

use crate::contracts::{
    LockResultExt, SequenceRecord, SequenceStore, StoreError, VersionToken, VersionedRecord,
};

/// Key prefix for sequence records
const SEQUENCE_PREFIX: &str = "hilo";
/// Width of the version header in front of every stored payload
const VERSION_LEN: usize = 8;

/// RocksDB-backed sequence store.
///
/// Value layout: `[version: u64 BE][JSON payload]`. Conditional writes take
/// `write_lock` so that the read-compare-write sequence is atomic; RocksDB
/// itself allows a single process per database directory.
pub struct RocksDbSequenceStore {
    db: DB,
    write_lock: Mutex<()>,
}

impl RocksDbSequenceStore {
    /// Opens or creates a RocksDB database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Sequence records are tiny and rarely written; keep the footprint small
        opts.set_write_buffer_size(4 * 1024 * 1024);
        opts.set_max_write_buffer_number(2);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(8 * 1024 * 1024));
        block_opts.set_cache_index_and_filter_blocks(true);
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, path).map_err(|e| StoreError::RocksDb(e.to_string()))?;
        tracing::info!(path = %path.display(), "Opened sequence store");

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Creates the storage key for a sequence.
    fn record_key(key: &str) -> String {
        format!("{}:{}", SEQUENCE_PREFIX, key)
    }

    /// Writes are synced so a reserved block survives an OS crash; reusing a
    /// block after restart would duplicate identifiers.
    fn write_options() -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        opts
    }

    fn encode(version: u64, record: &SequenceRecord) -> Result<Vec<u8>, StoreError> {
        let payload = record.to_json()?;
        let mut value = Vec::with_capacity(VERSION_LEN + payload.len());
        value.extend_from_slice(&version.to_be_bytes());
        value.extend_from_slice(&payload);
        Ok(value)
    }

    fn decode(bytes: &[u8]) -> Result<VersionedRecord, StoreError> {
        if bytes.len() < VERSION_LEN {
            return Err(StoreError::Serialization(format!(
                "Sequence value too short: {} bytes",
                bytes.len()
            )));
        }
        let (header, payload) = bytes.split_at(VERSION_LEN);
        let version = header
            .try_into()
            .map(u64::from_be_bytes)
            .map_err(|_| StoreError::Serialization("Invalid version header".into()))?;

        Ok(VersionedRecord {
            record: SequenceRecord::from_json(payload)?,
            version: VersionToken(version),
        })
    }

    fn read(&self, storage_key: &str) -> Result<Option<VersionedRecord>, StoreError> {
        match self.db.get(storage_key.as_bytes()) {
            Ok(Some(bytes)) => Ok(Some(Self::decode(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::RocksDb(e.to_string())),
        }
    }

    fn write(
        &self,
        storage_key: &str,
        version: u64,
        record: &SequenceRecord,
    ) -> Result<(), StoreError> {
        let value = Self::encode(version, record)?;
        self.db
            .put_opt(storage_key.as_bytes(), value, &Self::write_options())
            .map_err(|e| StoreError::RocksDb(e.to_string()))
    }
}

impl SequenceStore for RocksDbSequenceStore {
    fn get(&self, key: &str) -> Result<Option<VersionedRecord>, StoreError> {
        self.read(&Self::record_key(key))
    }

    fn create(&self, key: &str, record: &SequenceRecord) -> Result<VersionToken, StoreError> {
        let storage_key = Self::record_key(key);
        let _guard = self.write_lock.lock().map_lock_err::<StoreError>()?;

        if self.read(&storage_key)?.is_some() {
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
            });
        }

        let version = 1;
        self.write(&storage_key, version, record)?;
        Ok(VersionToken(version))
    }

    fn put(
        &self,
        key: &str,
        expected: VersionToken,
        record: &SequenceRecord,
    ) -> Result<VersionToken, StoreError> {
        let storage_key = Self::record_key(key);
        let _guard = self.write_lock.lock().map_lock_err::<StoreError>()?;

        let current = match self.read(&storage_key)? {
            Some(current) if current.version == expected => current,
            _ => {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                })
            }
        };

        let version = current.version.0.wrapping_add(1);
        self.write(&storage_key, version, record)?;
        Ok(VersionToken(version))
    }
}
