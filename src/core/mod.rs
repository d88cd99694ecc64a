//! Core abstractions and types
//!
//! Foundational types, ports and error definitions shared by the engine,
//! the adapters and the binary. Nothing here performs I/O.

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use error::{MonitorError, MonitorResult, QueryError, StorageError, ValidationError};
pub use traits::{LedgerQueryPort, WatermarkStore};
pub use types::{
    CreatedAsset, DeltaBatch, HealthSignal, HealthStatus, SubscriptionEvent, SubscriptionId,
    SubscriptionKind, SubscriptionStatus, TransactionPage, TransactionQuery, TransactionRecord,
    TransactionType, Watermark, WatermarkMode,
};
