//! In-process ledger for tests and offline runs
//!
//! Answers queries from an in-memory list of transactions, the way the
//! indexer would. Scripted pages and failures take precedence over the
//! ledger, one per query, so tests can reproduce overlapping windows and
//! outages.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

use crate::core::{
    CreatedAsset, LedgerQueryPort, QueryError, TransactionPage, TransactionQuery,
    TransactionRecord,
};
use crate::domain::Address;

#[derive(Default)]
struct MockState {
    ledger: Vec<TransactionRecord>,
    scripted: VecDeque<Result<TransactionPage, QueryError>>,
    queries: Vec<TransactionQuery>,
    created: HashMap<String, Vec<CreatedAsset>>,
    latest_round: u64,
}

/// Mock ledger query client that serves test data
#[derive(Default)]
pub struct MockLedgerClient {
    state: Mutex<MockState>,
    latency: Option<Duration>,
    queried: Notify,
}

impl MockLedgerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every transaction query
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_latest_round(self, round: u64) -> Self {
        self.lock().latest_round = round;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Confirm transactions on the mock ledger
    pub fn push_transactions(&self, records: impl IntoIterator<Item = TransactionRecord>) {
        let mut state = self.lock();
        for record in records {
            if let Some(round) = record.confirmed_round {
                state.latest_round = state.latest_round.max(round);
            }
            state.ledger.push(record);
        }
    }

    /// Answer the next query with exactly this page, ignoring the ledger
    pub fn push_page(&self, page: TransactionPage) {
        self.lock().scripted.push_back(Ok(page));
    }

    /// Fail the next `times` queries
    pub fn fail_next(&self, times: usize, error: QueryError) {
        let mut state = self.lock();
        for _ in 0..times {
            state.scripted.push_back(Err(error.clone()));
        }
    }

    pub fn set_latest_round(&self, round: u64) {
        self.lock().latest_round = round;
    }

    pub fn set_created_assets(&self, creator: &Address, assets: Vec<CreatedAsset>) {
        self.lock().created.insert(creator.to_string(), assets);
    }

    /// Every transaction query received so far
    pub fn queries(&self) -> Vec<TransactionQuery> {
        self.lock().queries.clone()
    }

    pub fn query_count(&self) -> usize {
        self.lock().queries.len()
    }

    /// Wait until at least `count` transaction queries have been received
    pub async fn wait_for_queries(&self, count: usize) {
        loop {
            let notified = self.queried.notified();
            if self.query_count() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Queries count as received before the simulated latency elapses
    async fn answer(&self, query: &TransactionQuery) -> Result<TransactionPage, QueryError> {
        let result = {
            let mut state = self.lock();
            state.queries.push(query.clone());
            match state.scripted.pop_front() {
                Some(scripted) => scripted,
                None => {
                    let mut matching: Vec<TransactionRecord> = state
                        .ledger
                        .iter()
                        .filter(|record| satisfies(record, query))
                        .cloned()
                        .collect();
                    matching.sort_by_key(|r| (r.confirmed_round, r.round_time));
                    if let Some(limit) = query.limit {
                        matching.truncate(limit as usize);
                    }
                    Ok(TransactionPage::new(matching).with_current_round(state.latest_round))
                }
            }
        };

        debug!("Mock ledger received query #{}", self.query_count());
        self.queried.notify_waiters();

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        result
    }
}

/// Indexer-side narrowing: inclusive lower bounds, exclusive upper bound
fn satisfies(record: &TransactionRecord, query: &TransactionQuery) -> bool {
    if let Some(address) = &query.address {
        if &record.sender != address && record.receiver.as_ref() != Some(address) {
            return false;
        }
    }
    if let Some(tx_type) = &query.tx_type {
        if &record.tx_type != tx_type {
            return false;
        }
    }
    if query.asset_id.is_some() && record.asset_id != query.asset_id {
        return false;
    }
    if query.application_id.is_some() && record.application_id != query.application_id {
        return false;
    }
    if let Some(bound) = query.currency_greater_than {
        if !record.amount.is_some_and(|amount| amount > bound) {
            return false;
        }
    }
    if let Some(after) = query.after_time {
        if record.round_time < after {
            return false;
        }
    }
    if let Some(before) = query.before_time {
        if record.round_time >= before {
            return false;
        }
    }
    if let Some(min_round) = query.min_round {
        if !record.confirmed_round.is_some_and(|round| round >= min_round) {
            return false;
        }
    }
    true
}

#[async_trait]
impl LedgerQueryPort for MockLedgerClient {
    async fn search_transactions(&self, query: &TransactionQuery) -> Result<TransactionPage, QueryError> {
        self.answer(query).await
    }

    async fn account_transactions(
        &self,
        address: &Address,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, QueryError> {
        let query = query.clone().with_address(address.as_str());
        self.answer(&query).await
    }

    async fn created_assets(&self, address: &Address) -> Result<Vec<CreatedAsset>, QueryError> {
        Ok(self
            .lock()
            .created
            .get(address.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn latest_round(&self) -> Result<u64, QueryError> {
        Ok(self.lock().latest_round)
    }
}
