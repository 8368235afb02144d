//! Thread-safe histogram for block refill latency.
//!
//! Fixed buckets cover store round trips from 50μs up to one second so that
//! `histogram_quantile()` works on the Prometheus side.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of finite buckets.
pub const BUCKET_COUNT: usize = 10;

/// Fixed histogram buckets in microseconds.
pub const HISTOGRAM_BUCKETS: [u64; BUCKET_COUNT] = [
    50,        // 50μs
    100,       // 100μs
    250,       // 250μs
    500,       // 500μs
    1_000,     // 1ms
    5_000,     // 5ms
    10_000,    // 10ms
    50_000,    // 50ms
    250_000,   // 250ms
    1_000_000, // 1s
];

/// Lock-free latency histogram with cumulative buckets.
///
/// # Example
///
/// ```
/// use hilo::metrics::Histogram;
///
/// let histogram = Histogram::new();
/// histogram.observe(300);
///
/// let (sum, count, buckets) = histogram.snapshot();
/// assert_eq!((sum, count), (300, 1));
/// assert_eq!(buckets[2], 0);
/// assert_eq!(buckets[3], 1);
/// ```
pub struct Histogram {
    sum: AtomicU64,
    count: AtomicU64,
    buckets: [AtomicU64; BUCKET_COUNT],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    /// Creates a new empty histogram.
    pub fn new() -> Self {
        Self {
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Records an observation in microseconds.
    #[inline]
    pub fn observe(&self, value_us: u64) {
        self.sum.fetch_add(value_us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (bucket, &boundary) in self.buckets.iter().zip(HISTOGRAM_BUCKETS.iter()) {
            if value_us <= boundary {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Returns `(sum, count, cumulative_bucket_counts)`.
    pub fn snapshot(&self) -> (u64, u64, [u64; BUCKET_COUNT]) {
        let buckets = std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed));
        (
            self.sum.load(Ordering::Relaxed),
            self.count.load(Ordering::Relaxed),
            buckets,
        )
    }

    /// Returns the current count of observations.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Formats the histogram as Prometheus exposition text.
    pub fn format_prometheus(&self, name: &str, help: &str, labels: &str) -> String {
        let mut output = String::with_capacity(1024);
        let _ = writeln!(output, "# HELP {} {}", name, help);
        let _ = writeln!(output, "# TYPE {} histogram", name);
        self.write_samples(&mut output, name, labels);
        output
    }

    /// Appends the bucket, sum and count samples without `# HELP`/`# TYPE`
    /// lines, for callers that group several label sets under one family.
    pub fn write_samples(&self, output: &mut String, name: &str, labels: &str) {
        let (sum, count, buckets) = self.snapshot();
        let sep = if labels.is_empty() { "" } else { "," };

        for (boundary, bucket) in HISTOGRAM_BUCKETS.iter().zip(buckets.iter()) {
            let _ = writeln!(
                output,
                "{}_bucket{{{}{}le=\"{}\"}} {}",
                name, labels, sep, boundary, bucket
            );
        }
        let _ = writeln!(
            output,
            "{}_bucket{{{}{}le=\"+Inf\"}} {}",
            name, labels, sep, count
        );
        let _ = writeln!(output, "{}_sum{{{}}} {}", name, labels, sum);
        let _ = writeln!(output, "{}_count{{{}}} {}", name, labels, count);
    }
}
