//! HTTP client for the Algorand indexer REST API
//!
//! Implements only the endpoints the monitor needs: transaction search, account
//! transactions, created assets and the health probe used to learn the current
//! round.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::IndexerConfig;
use crate::core::{
    CreatedAsset, LedgerQueryPort, QueryError, TransactionPage, TransactionQuery,
    TransactionRecord, TransactionType,
};
use crate::domain::Address;

const API_TOKEN_HEADER: &str = "X-Indexer-API-Token";

/// Indexer REST client, shared by every subscription loop
pub struct IndexerClient {
    base_url: String,
    api_token: Option<String>,
    http: Client,
    timeout: Duration,
    page_limit: u32,
    max_pages: u32,
}

/// `/v2/transactions` and `/v2/accounts/{address}/transactions`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct TransactionsResponse {
    current_round: Option<u64>,
    next_token: Option<String>,
    transactions: Vec<RawTransaction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RawTransaction {
    id: String,
    tx_type: String,
    sender: String,
    fee: u64,
    /// Unix seconds
    round_time: Option<i64>,
    confirmed_round: Option<u64>,
    note: Option<String>,
    created_asset_index: Option<u64>,
    created_application_index: Option<u64>,
    payment_transaction: Option<RawPayment>,
    asset_transfer_transaction: Option<RawAssetTransfer>,
    asset_config_transaction: Option<RawAssetConfig>,
    asset_freeze_transaction: Option<RawAssetConfig>,
    application_transaction: Option<RawApplicationCall>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RawPayment {
    amount: u64,
    receiver: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RawAssetTransfer {
    amount: u64,
    asset_id: u64,
    receiver: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RawAssetConfig {
    asset_id: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RawApplicationCall {
    application_id: u64,
    application_args: Vec<String>,
}

/// `/v2/accounts/{address}/created-assets`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct CreatedAssetsResponse {
    assets: Vec<RawAsset>,
    next_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RawAsset {
    index: u64,
    deleted: bool,
    params: RawAssetParams,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RawAssetParams {
    creator: String,
    name: Option<String>,
    unit_name: Option<String>,
    total: u64,
    decimals: u32,
    url: Option<String>,
}

/// `/health`
#[derive(Debug, Deserialize)]
struct HealthResponse {
    round: u64,
}

impl IndexerClient {
    /// Create a client for `endpoint`, e.g. `https://testnet-idx.algonode.cloud`
    pub fn new(
        endpoint: &str,
        api_token: Option<String>,
        timeout: Duration,
        page_limit: u32,
        max_pages: u32,
    ) -> Result<Self, QueryError> {
        let base_url = endpoint.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(QueryError::InvalidEndpoint(endpoint.to_string()));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::Http(e.to_string()))?;

        Ok(Self {
            base_url,
            api_token: api_token.filter(|t| !t.is_empty()),
            http,
            timeout,
            page_limit: page_limit.max(1),
            max_pages: max_pages.max(1),
        })
    }

    pub fn from_config(config: &IndexerConfig) -> Result<Self, QueryError> {
        Self::new(
            config.endpoint(),
            config.api_token.clone(),
            config.request_timeout(),
            config.page_limit,
            config.max_pages_per_cycle,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a GET and decode the JSON body
    async fn get<T>(&self, path: &str, params: &[(&str, String)]) -> Result<T, QueryError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Indexer GET {} with params: {:?}", url, params);

        let mut request = self.http.get(&url).query(params);
        if let Some(token) = &self.api_token {
            request = request.header(API_TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let body = response.text().await.map_err(|e| self.map_error(e))?;
        serde_json::from_str(&body).map_err(|e| QueryError::Decode(e.to_string()))
    }

    fn map_error(&self, err: reqwest::Error) -> QueryError {
        if err.is_timeout() {
            QueryError::Timeout(self.timeout)
        } else {
            err.into()
        }
    }

    /// Follow `next-token` up to the configured page budget
    async fn paginate(&self, path: &str, query: &TransactionQuery) -> Result<TransactionPage, QueryError> {
        let mut base_params = query.to_params();
        if query.limit.is_none() {
            base_params.push(("limit", self.page_limit.to_string()));
        }

        let mut page = TransactionPage::default();
        let mut next: Option<String> = None;

        for page_number in 0..self.max_pages {
            let mut params = base_params.clone();
            if let Some(token) = &next {
                params.push(("next", token.clone()));
            }

            let response: TransactionsResponse = self.get(path, &params).await?;
            let fetched = response.transactions.len();
            if page.current_round.is_none() {
                page.current_round = response.current_round;
            }
            page.transactions
                .extend(response.transactions.into_iter().filter_map(into_record));

            next = response.next_token.filter(|t| !t.is_empty());
            if next.is_none() || fetched == 0 {
                return Ok(page);
            }

            debug!("Fetched page {} of {} ({} transactions)", page_number + 1, path, fetched);
        }

        warn!(
            "Stopped after {} pages for {}; remaining results deferred to the next cycle",
            self.max_pages, path
        );
        Ok(page.truncated())
    }
}

#[async_trait]
impl LedgerQueryPort for IndexerClient {
    async fn search_transactions(&self, query: &TransactionQuery) -> Result<TransactionPage, QueryError> {
        self.paginate("/v2/transactions", query).await
    }

    async fn account_transactions(
        &self,
        address: &Address,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, QueryError> {
        // The address is part of the path here
        let mut query = query.clone();
        query.address = None;
        let path = format!("/v2/accounts/{}/transactions", address);
        self.paginate(&path, &query).await
    }

    async fn created_assets(&self, address: &Address) -> Result<Vec<CreatedAsset>, QueryError> {
        let path = format!("/v2/accounts/{}/created-assets", address);
        let mut assets = Vec::new();
        let mut next: Option<String> = None;

        for _ in 0..self.max_pages {
            let mut params = vec![("limit", self.page_limit.to_string())];
            if let Some(token) = &next {
                params.push(("next", token.clone()));
            }

            let response: CreatedAssetsResponse = self.get(&path, &params).await?;
            let fetched = response.assets.len();
            assets.extend(response.assets.into_iter().map(into_asset));

            next = response.next_token.filter(|t| !t.is_empty());
            if next.is_none() || fetched == 0 {
                break;
            }
        }

        Ok(assets)
    }

    async fn latest_round(&self) -> Result<u64, QueryError> {
        let health: HealthResponse = self.get("/health", &[]).await?;
        Ok(health.round)
    }
}

fn status_error(status: StatusCode, body: String) -> QueryError {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or(body);
    QueryError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Decode one indexer transactions response body into records.
/// Entries without an id or round time are skipped.
pub fn parse_transactions(body: &str) -> Result<TransactionPage, QueryError> {
    let response: TransactionsResponse =
        serde_json::from_str(body).map_err(|e| QueryError::Decode(e.to_string()))?;
    let mut page = TransactionPage::new(
        response.transactions.into_iter().filter_map(into_record).collect(),
    );
    page.current_round = response.current_round;
    Ok(page)
}

fn into_record(raw: RawTransaction) -> Option<TransactionRecord> {
    if raw.id.is_empty() {
        return None;
    }
    let round_time = match raw.round_time.and_then(unix_time) {
        Some(t) => t,
        None => {
            warn!("Skipping transaction {} without round time", raw.id);
            return None;
        }
    };

    let mut record = TransactionRecord::new(
        raw.id,
        TransactionType::parse_lenient(&raw.tx_type),
        raw.sender,
        round_time,
    )
    .with_fee(raw.fee);
    record.confirmed_round = raw.confirmed_round;
    record.note = raw.note.as_deref().and_then(decode_base64);

    if let Some(pay) = raw.payment_transaction {
        record.amount = Some(pay.amount);
        record.receiver = non_empty(pay.receiver);
    }
    if let Some(xfer) = raw.asset_transfer_transaction {
        record.amount = Some(xfer.amount);
        record.asset_id = non_zero(xfer.asset_id);
        record.receiver = non_empty(xfer.receiver);
    }
    if let Some(cfg) = raw.asset_config_transaction {
        // Zero on creation; the new index is reported separately
        record.creates_asset = cfg.asset_id == 0;
        record.asset_id = non_zero(cfg.asset_id).or(raw.created_asset_index);
    }
    if let Some(freeze) = raw.asset_freeze_transaction {
        record.asset_id = non_zero(freeze.asset_id);
    }
    if let Some(app) = raw.application_transaction {
        record.application_id = non_zero(app.application_id).or(raw.created_application_index);
        record.application_args = app
            .application_args
            .iter()
            .filter_map(|arg| decode_base64(arg))
            .collect();
    }

    Some(record)
}

fn into_asset(raw: RawAsset) -> CreatedAsset {
    CreatedAsset {
        index: raw.index,
        creator: raw.params.creator,
        name: raw.params.name,
        unit_name: raw.params.unit_name,
        total: raw.params.total,
        decimals: raw.params.decimals,
        url: raw.params.url,
        deleted: raw.deleted,
    }
}

fn unix_time(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

fn decode_base64(value: &str) -> Option<Vec<u8>> {
    STANDARD.decode(value).ok()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn non_zero(value: u64) -> Option<u64> {
    (value != 0).then_some(value)
}
