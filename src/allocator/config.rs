use crate::allocator::compose::{DEFAULT_CAPACITY, MAX_CAPACITY};
use crate::allocator::retry::RetryConfig;
use crate::contracts::HiLoError;

/// Well-known key of the replication version sequence.
pub const DEFAULT_SEQUENCE_KEY: &str = "hilo/replication/version";

/// Configuration for one Hi-Lo allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Backing-store key of the sequence record
    pub key: String,
    /// Identifiers per reserved block
    pub capacity: u64,
    /// Conflict retry policy for block reservation
    pub retry: RetryConfig,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_SEQUENCE_KEY.to_string(),
            capacity: DEFAULT_CAPACITY,
            retry: RetryConfig::default(),
        }
    }
}

impl AllocatorConfig {
    /// Creates a config for `key` with default capacity and retry policy.
    pub fn for_key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Sets the block size.
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the conflict retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Creates an AllocatorConfig from environment variables.
    ///
    /// Environment variables:
    /// - `HILO_SEQUENCE_KEY`: Backing-store key (default: `hilo/replication/version`)
    /// - `HILO_CAPACITY`: Identifiers per block (default: 16384)
    /// - plus the retry variables read by [`RetryConfig::from_env`]
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            key: std::env::var("HILO_SEQUENCE_KEY")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(default.key),
            capacity: std::env::var("HILO_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.capacity),
            retry: RetryConfig::from_env(),
        }
    }

    /// Checks the config before an allocator is built from it.
    pub fn validate(&self) -> Result<(), HiLoError> {
        if self.key.is_empty() {
            return Err(HiLoError::InvalidConfig("sequence key is empty".into()));
        }
        if !(1..=MAX_CAPACITY).contains(&self.capacity) {
            return Err(HiLoError::InvalidConfig(format!(
                "capacity {} outside 1..={}",
                self.capacity, MAX_CAPACITY
            )));
        }
        Ok(())
    }
}
