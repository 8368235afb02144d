mod memory;
mod rocksdb;

pub use self::memory::InMemorySequenceStore;
pub use self::rocksdb::RocksDbSequenceStore;
