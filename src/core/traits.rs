//! Core trait abstractions (ports between the engine and the outside world)

use async_trait::async_trait;

use super::error::{MonitorResult, QueryError};
use super::types::*;
use crate::domain::address::Address;

/// Ledger query port - the indexer/node boundary.
///
/// Implementations are shared by every subscription's loop and must be safe
/// for concurrent, stateless per-request use.
#[async_trait]
pub trait LedgerQueryPort: Send + Sync {
    /// Search confirmed transactions matching the query
    async fn search_transactions(&self, query: &TransactionQuery) -> Result<TransactionPage, QueryError>;

    /// Transactions involving one account
    async fn account_transactions(
        &self,
        address: &Address,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, QueryError>;

    /// Assets created by an account
    async fn created_assets(&self, address: &Address) -> Result<Vec<CreatedAsset>, QueryError>;

    /// Latest round the indexer has ingested
    async fn latest_round(&self) -> Result<u64, QueryError>;
}

/// Watermark persistence port, keyed by subscription id
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Last persisted position, `None` for a subscription that never completed a cycle
    async fn get(&self, id: &SubscriptionId) -> MonitorResult<Option<Watermark>>;

    /// Upsert the position
    async fn set(&self, id: &SubscriptionId, watermark: Watermark) -> MonitorResult<()>;

    /// Discard the position
    async fn remove(&self, id: &SubscriptionId) -> MonitorResult<()>;
}
