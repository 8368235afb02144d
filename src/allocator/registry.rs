use std::sync::Arc;

use dashmap::DashMap;

use crate::allocator::config::AllocatorConfig;
use crate::allocator::hilo::HiLoAllocator;
use crate::contracts::{HiLoError, SequenceStore};
use crate::metrics::AllocatorMetrics;

/// One allocator per sequence key over a shared store.
///
/// Keeps a single in-process instance per key so that callers of the same
/// sequence share its current block instead of each reserving their own.
pub struct HiLoRegistry<S: ?Sized> {
    store: Arc<S>,
    /// Capacity and retry policy applied to every allocator; its key is unused
    template: AllocatorConfig,
    allocators: DashMap<String, Arc<HiLoAllocator<S>>>,
}

impl<S> HiLoRegistry<S>
where
    S: SequenceStore + ?Sized,
{
    /// Creates a registry whose allocators use `template`'s capacity and
    /// retry policy.
    pub fn new(store: Arc<S>, template: AllocatorConfig) -> Result<Self, HiLoError> {
        template.validate()?;
        Ok(Self {
            store,
            template,
            allocators: DashMap::new(),
        })
    }

    /// Gets or creates the allocator for `key`.
    pub fn allocator(&self, key: &str) -> Result<Arc<HiLoAllocator<S>>, HiLoError> {
        if let Some(existing) = self.allocators.get(key) {
            return Ok(Arc::clone(existing.value()));
        }

        let entry = self
            .allocators
            .entry(key.to_string())
            .or_try_insert_with(|| {
                let config = AllocatorConfig {
                    key: key.to_string(),
                    ..self.template.clone()
                };
                tracing::debug!(key, capacity = config.capacity, "Creating allocator");
                HiLoAllocator::new(Arc::clone(&self.store), config).map(Arc::new)
            })?;

        Ok(Arc::clone(entry.value()))
    }

    /// Returns the next identifier of the sequence stored under `key`.
    pub fn next_id(&self, key: &str) -> Result<u64, HiLoError> {
        self.allocator(key)?.next_id()
    }

    /// Lists the keys with a live allocator, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.allocators.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Formats metrics of every allocator in Prometheus exposition format.
    pub fn format_prometheus(&self) -> String {
        let mut allocators: Vec<Arc<HiLoAllocator<S>>> = self
            .allocators
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        allocators.sort_by(|a, b| a.key().cmp(b.key()));

        let metrics: Vec<&AllocatorMetrics> =
            allocators.iter().map(|a| a.metrics().as_ref()).collect();
        AllocatorMetrics::format_prometheus_all(&metrics)
    }
}
