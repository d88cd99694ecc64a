//! Adapters layer - infrastructure implementations of the core ports
//!
//! The indexer adapters implement LedgerQueryPort and the storage adapters
//! implement WatermarkStore.

pub mod indexer;
pub mod storage;

pub use indexer::IndexerClient;
#[cfg(feature = "mock-indexer")]
pub use indexer::MockLedgerClient;
pub use storage::{open_store, InMemoryWatermarkStore, RocksDbWatermarkStore};
