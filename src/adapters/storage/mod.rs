//! Watermark storage adapters
//!
//! Both backends implement the WatermarkStore port; the engine only ever sees
//! the trait object.

pub mod memory;
pub mod rocksdb;

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::core::{MonitorResult, WatermarkStore};

pub use memory::InMemoryWatermarkStore;
pub use self::rocksdb::{ColumnFamilies, RocksDbWatermarkStore};

/// Build the configured backend
pub fn open_store(config: &StorageConfig) -> MonitorResult<Arc<dyn WatermarkStore>> {
    Ok(match config.backend {
        StorageBackend::Memory => Arc::new(InMemoryWatermarkStore::new()),
        StorageBackend::Rocksdb => Arc::new(RocksDbWatermarkStore::open(&config.rocksdb)?),
    })
}
