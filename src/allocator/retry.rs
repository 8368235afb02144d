//! Conflict retry policy for block reservation.

use backon::ExponentialBuilder;
use std::time::Duration;

/// Configuration for retrying optimistic-concurrency conflicts.
///
/// `max_conflict_retries = None` retries until the reservation wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries after a conflict, `None` for unbounded.
    pub max_conflict_retries: Option<usize>,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: None,
            initial_delay_ms: 1,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Creates a RetryConfig from environment variables.
    ///
    /// Environment variables:
    /// - `HILO_MAX_CONFLICT_RETRIES`: Maximum retries per reservation (default: unbounded)
    /// - `HILO_RETRY_INITIAL_MS`: Initial backoff delay in ms (default: 1)
    /// - `HILO_RETRY_MAX_MS`: Maximum backoff delay in ms (default: 100)
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_conflict_retries: std::env::var("HILO_MAX_CONFLICT_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(default.max_conflict_retries),
            initial_delay_ms: std::env::var("HILO_RETRY_INITIAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.initial_delay_ms),
            max_delay_ms: std::env::var("HILO_RETRY_MAX_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_delay_ms),
        }
    }

    /// Retries immediately and forever.
    pub fn unbounded_immediate() -> Self {
        Self {
            max_conflict_retries: None,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Creates an exponential backoff builder with jitter.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_conflict_retries.unwrap_or(usize::MAX))
            .with_jitter()
    }
}
