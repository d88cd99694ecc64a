//! Centralized error types for the monitor

use std::time::Duration;
use thiserror::Error;

use super::types::SubscriptionId;

/// Main monitor error type
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Subscription not found: {id}")]
    NotFound { id: SubscriptionId },

    #[error("Subscription already exists: {id}")]
    AlreadyExists { id: SubscriptionId },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Malformed input supplied when creating a subscription or running a lookup.
/// Rejected synchronously; nothing is registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid address {value:?}: {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("Invalid {field} {value:?}: expected a non-zero integer id")]
    InvalidId { field: &'static str, value: String },

    #[error("Invalid amount {0:?}: expected an integer in base units")]
    InvalidAmount(String),

    #[error("Unknown transaction type: {0:?}")]
    UnknownTransactionType(String),

    #[error("Poll interval {0}s is outside 1..=3600")]
    InvalidPollInterval(u64),

    #[error("Unknown time frame {0:?}: expected day, week, month or year")]
    InvalidTimeFrame(String),

    #[error("{kind} subscription requires {field}")]
    MissingField { kind: &'static str, field: &'static str },
}

/// Indexer failures during a query. Always transient from the engine's point of view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Indexer returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode indexer response: {0}")]
    Decode(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Watermark persistence errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDB(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            QueryError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            QueryError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            QueryError::Http(err.to_string())
        }
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        MonitorError::Query(err.into())
    }
}

/// Helper to convert rocksdb errors
impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::RocksDB(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl MonitorError {
    /// True for failures a poll cycle retries on its next tick
    pub fn is_transient(&self) -> bool {
        matches!(self, MonitorError::Query(_) | MonitorError::Storage(_))
    }
}
