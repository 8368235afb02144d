use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use hilo::allocator::{AllocatorConfig, HiLoAllocator};
use hilo::storage::RocksDbSequenceStore;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hilo=info".parse()?))
        .init();

    let data_dir = std::env::var("HILO_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let store = Arc::new(RocksDbSequenceStore::open(&data_dir)?);

    let config = AllocatorConfig::from_env();
    tracing::info!(
        key = %config.key,
        capacity = config.capacity,
        max_conflict_retries = ?config.retry.max_conflict_retries,
        "Allocator configured"
    );
    let allocator = HiLoAllocator::new(store, config)?;

    let count: u64 = std::env::var("HILO_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    for _ in 0..count {
        println!("{}", allocator.next_id()?);
    }

    tracing::info!(
        block = ?allocator.current_block(),
        issued = count,
        "Done"
    );
    eprint!("{}", allocator.metrics().format_prometheus());

    Ok(())
}
