pub mod error;
pub mod sequence;
pub mod store;

pub use error::{HiLoError, LockResultExt, PoisonedLock, StoreError};
pub use sequence::IdGenerator;
pub use store::{SequenceRecord, SequenceStore, VersionToken, VersionedRecord};
