//! Per-sequence allocator metrics.
//!
//! Only the refill path records anything; the fast path stays a single
//! atomic increment.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Histogram;

/// Counters for one allocator instance.
pub struct AllocatorMetrics {
    key: String,
    /// Blocks successfully reserved from the store
    pub blocks_reserved_total: AtomicU64,
    /// Optimistic-concurrency conflicts hit while reserving
    pub conflicts_total: AtomicU64,
    /// Refills that ended in an error surfaced to the caller
    pub refill_failures_total: AtomicU64,
    /// Duration of each refill, including conflict retries
    pub refill_duration_us: Histogram,
}

impl AllocatorMetrics {
    /// Creates metrics labelled with the sequence key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            blocks_reserved_total: AtomicU64::new(0),
            conflicts_total: AtomicU64::new(0),
            refill_failures_total: AtomicU64::new(0),
            refill_duration_us: Histogram::new(),
        }
    }

    #[inline]
    pub fn record_block_reserved(&self, duration_us: u64) {
        self.blocks_reserved_total.fetch_add(1, Ordering::Relaxed);
        self.refill_duration_us.observe(duration_us);
    }

    #[inline]
    pub fn record_conflict(&self) {
        self.conflicts_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_refill_failure(&self, duration_us: u64) {
        self.refill_failures_total.fetch_add(1, Ordering::Relaxed);
        self.refill_duration_us.observe(duration_us);
    }

    pub fn blocks_reserved(&self) -> u64 {
        self.blocks_reserved_total.load(Ordering::Relaxed)
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts_total.load(Ordering::Relaxed)
    }

    pub fn refill_failures(&self) -> u64 {
        self.refill_failures_total.load(Ordering::Relaxed)
    }

    fn labels(&self) -> String {
        format!("key=\"{}\"", self.key.replace('\\', "\\\\").replace('"', "\\\""))
    }

    /// Formats the metrics in Prometheus exposition format.
    pub fn format_prometheus(&self) -> String {
        Self::format_prometheus_all(&[self])
    }

    /// Formats several allocators' metrics as one exposition.
    ///
    /// Each family gets a single `# HELP`/`# TYPE` header followed by one
    /// labelled sample per allocator; Prometheus rejects a repeated `TYPE` line.
    pub fn format_prometheus_all(metrics: &[&AllocatorMetrics]) -> String {
        let mut output = String::with_capacity(1024 + metrics.len() * 1024);
        let labels: Vec<String> = metrics.iter().map(|m| m.labels()).collect();

        let counters: [(&str, &str, fn(&AllocatorMetrics) -> u64); 3] = [
            (
                "hilo_blocks_reserved_total",
                "Total blocks reserved from the sequence store",
                AllocatorMetrics::blocks_reserved,
            ),
            (
                "hilo_conflicts_total",
                "Total version conflicts while reserving blocks",
                AllocatorMetrics::conflicts,
            ),
            (
                "hilo_refill_failures_total",
                "Total block refills that failed with a store error",
                AllocatorMetrics::refill_failures,
            ),
        ];

        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {} {}", name, help);
            let _ = writeln!(output, "# TYPE {} counter", name);
            for (m, labels) in metrics.iter().zip(&labels) {
                let _ = writeln!(output, "{}{{{}}} {}", name, labels, value(*m));
            }
            output.push('\n');
        }

        let name = "hilo_refill_duration_us";
        let _ = writeln!(
            output,
            "# HELP {} Histogram of block refill durations in microseconds",
            name
        );
        let _ = writeln!(output, "# TYPE {} histogram", name);
        for (m, labels) in metrics.iter().zip(&labels) {
            m.refill_duration_us.write_samples(&mut output, name, labels);
        }

        output
    }
}
