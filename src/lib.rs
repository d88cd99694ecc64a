//! Algorand ledger monitor library
//!
//! Watermark-based incremental subscriptions over an Algorand indexer:
//! wallets, smart contracts and assets are polled on their own cadence and
//! observers receive only transactions they have not seen before.

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod engine;

// Re-export commonly used types
pub use config::MonitorConfig;
pub use crate::core::{
    DeltaBatch, HealthSignal, HealthStatus, LedgerQueryPort, MonitorError, MonitorResult,
    SubscriptionEvent, SubscriptionId, SubscriptionKind, SubscriptionStatus, TransactionRecord,
    Watermark, WatermarkMode, WatermarkStore,
};
pub use domain::{Address, Filter, FilterInput, TimeFrame};
pub use engine::{SubscriptionInfo, SubscriptionManager};
