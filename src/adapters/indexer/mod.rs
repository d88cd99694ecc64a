//! Ledger query adapters

pub mod client;
#[cfg(feature = "mock-indexer")]
pub mod mock;

pub use client::{parse_transactions, IndexerClient};
#[cfg(feature = "mock-indexer")]
pub use mock::MockLedgerClient;
