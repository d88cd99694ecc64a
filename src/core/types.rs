//! Core domain types

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::error::ValidationError;

/// Namespace for ids derived from subscription names
const SUBSCRIPTION_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_3c52_9e4b_4d7a_8c2e_51b0_f3d9_a6e4);

/// Identifier handed out by the subscription manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Stable id for a named subscription, identical across restarts
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&SUBSCRIPTION_NAMESPACE, name.as_bytes()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SubscriptionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// What a subscription watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
    /// Payments and asset transfers to or from an account
    Wallet,
    /// Application calls against a smart contract
    Contract,
    /// Assets created by an account, or transfers of one asset
    Asset,
}

impl SubscriptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionKind::Wallet => "wallet",
            SubscriptionKind::Contract => "contract",
            SubscriptionKind::Asset => "asset",
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state. There is no other state; Active is re-entered by starting again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Inactive,
    Active,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::Inactive => write!(f, "inactive"),
            SubscriptionStatus::Active => write!(f, "active"),
        }
    }
}

/// Ledger transaction type as reported by the indexer (`tx-type`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Payment,
    KeyRegistration,
    AssetConfig,
    AssetTransfer,
    AssetFreeze,
    ApplicationCall,
    StateProof,
    Heartbeat,
    /// Type string this build does not know; never produced by user input
    Unknown(String),
}

impl TransactionType {
    pub fn as_str(&self) -> &str {
        match self {
            TransactionType::Payment => "pay",
            TransactionType::KeyRegistration => "keyreg",
            TransactionType::AssetConfig => "acfg",
            TransactionType::AssetTransfer => "axfer",
            TransactionType::AssetFreeze => "afrz",
            TransactionType::ApplicationCall => "appl",
            TransactionType::StateProof => "stpf",
            TransactionType::Heartbeat => "hb",
            TransactionType::Unknown(raw) => raw,
        }
    }

    /// Indexer responses may carry types newer than this build
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse()
            .unwrap_or_else(|_| TransactionType::Unknown(raw.to_string()))
    }

    /// Whether records of this type carry a transferred amount
    pub fn carries_amount(&self) -> bool {
        matches!(self, TransactionType::Payment | TransactionType::AssetTransfer)
    }
}

impl FromStr for TransactionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pay" => Ok(TransactionType::Payment),
            "keyreg" => Ok(TransactionType::KeyRegistration),
            "acfg" => Ok(TransactionType::AssetConfig),
            "axfer" => Ok(TransactionType::AssetTransfer),
            "afrz" => Ok(TransactionType::AssetFreeze),
            "appl" => Ok(TransactionType::ApplicationCall),
            "stpf" => Ok(TransactionType::StateProof),
            "hb" => Ok(TransactionType::Heartbeat),
            other => Err(ValidationError::UnknownTransactionType(other.to_string())),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TransactionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TransactionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TransactionType::parse_lenient(&raw))
    }
}

/// A confirmed transaction as returned by the indexer. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub tx_type: TransactionType,
    pub sender: String,
    pub receiver: Option<String>,
    /// Base units (microAlgos or the asset's smallest unit)
    pub amount: Option<u64>,
    pub asset_id: Option<u64>,
    pub application_id: Option<u64>,
    pub round_time: DateTime<Utc>,
    pub confirmed_round: Option<u64>,
    pub fee: u64,
    #[serde(default)]
    pub note: Option<Vec<u8>>,
    #[serde(default)]
    pub application_args: Vec<Vec<u8>>,
    /// Asset configuration that created a new asset
    #[serde(default)]
    pub creates_asset: bool,
}

impl TransactionRecord {
    pub fn new(
        id: impl Into<String>,
        tx_type: TransactionType,
        sender: impl Into<String>,
        round_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            tx_type,
            sender: sender.into(),
            receiver: None,
            amount: None,
            asset_id: None,
            application_id: None,
            round_time,
            confirmed_round: None,
            fee: 0,
            note: None,
            application_args: Vec::new(),
            creates_asset: false,
        }
    }

    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_asset(mut self, asset_id: u64) -> Self {
        self.asset_id = Some(asset_id);
        self
    }

    pub fn with_application(mut self, application_id: u64) -> Self {
        self.application_id = Some(application_id);
        self
    }

    pub fn with_round(mut self, round: u64) -> Self {
        self.confirmed_round = Some(round);
        self
    }

    /// Mark as the configuration transaction that created `asset_id`
    pub fn creating_asset(mut self, asset_id: u64) -> Self {
        self.asset_id = Some(asset_id);
        self.creates_asset = true;
        self
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Position just past this record under the given mode
    pub fn position(&self, mode: WatermarkMode) -> Option<Watermark> {
        match mode {
            WatermarkMode::Timestamp => Some(Watermark::Timestamp(self.round_time)),
            WatermarkMode::Round => self.confirmed_round.map(|r| Watermark::Round(r + 1)),
        }
    }
}

/// How far a subscription has processed the ledger, exclusive.
///
/// Persisted as a bare integer round or an RFC 3339 timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Watermark {
    Round(u64),
    Timestamp(DateTime<Utc>),
}

impl Watermark {
    pub fn mode(&self) -> WatermarkMode {
        match self {
            Watermark::Round(_) => WatermarkMode::Round,
            Watermark::Timestamp(_) => WatermarkMode::Timestamp,
        }
    }

    /// Monotonic advance: never moves backwards. A candidate in a different
    /// mode (config changed between runs) replaces the old position.
    pub fn advance(self, candidate: Watermark) -> Watermark {
        match (self, candidate) {
            (Watermark::Round(a), Watermark::Round(b)) => Watermark::Round(a.max(b)),
            (Watermark::Timestamp(a), Watermark::Timestamp(b)) => Watermark::Timestamp(a.max(b)),
            (_, other) => other,
        }
    }

    /// Lower query bound, reaching back to cover indexer lag
    pub fn with_overlap(&self, overlap: Duration, overlap_rounds: u64) -> Watermark {
        match self {
            Watermark::Round(r) => Watermark::Round(r.saturating_sub(overlap_rounds)),
            Watermark::Timestamp(t) => {
                let back = ChronoDuration::from_std(overlap).unwrap_or_else(|_| ChronoDuration::zero());
                Watermark::Timestamp(*t - back)
            }
        }
    }
}

impl PartialOrd for Watermark {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Watermark::Round(a), Watermark::Round(b)) => a.partial_cmp(b),
            (Watermark::Timestamp(a), Watermark::Timestamp(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watermark::Round(r) => write!(f, "round {}", r),
            Watermark::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

/// Which position flavour a deployment tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkMode {
    #[default]
    Timestamp,
    Round,
}

/// Indexer search parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionQuery {
    pub address: Option<String>,
    pub tx_type: Option<TransactionType>,
    pub asset_id: Option<u64>,
    pub application_id: Option<u64>,
    /// Strictly-greater-than amount bound pushed down to the indexer
    pub currency_greater_than: Option<u64>,
    pub after_time: Option<DateTime<Utc>>,
    pub before_time: Option<DateTime<Utc>>,
    pub min_round: Option<u64>,
    pub limit: Option<u32>,
}

impl TransactionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_tx_type(mut self, tx_type: TransactionType) -> Self {
        self.tx_type = Some(tx_type);
        self
    }

    pub fn with_after_time(mut self, after: DateTime<Utc>) -> Self {
        self.after_time = Some(after);
        self
    }

    pub fn with_before_time(mut self, before: DateTime<Utc>) -> Self {
        self.before_time = Some(before);
        self
    }

    pub fn with_min_round(mut self, round: u64) -> Self {
        self.min_round = Some(round);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string pairs in indexer parameter naming
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(address) = &self.address {
            params.push(("address", address.clone()));
        }
        if let Some(tx_type) = &self.tx_type {
            params.push(("tx-type", tx_type.to_string()));
        }
        if let Some(asset_id) = self.asset_id {
            params.push(("asset-id", asset_id.to_string()));
        }
        if let Some(app_id) = self.application_id {
            params.push(("application-id", app_id.to_string()));
        }
        if let Some(amount) = self.currency_greater_than {
            params.push(("currency-greater-than", amount.to_string()));
        }
        if let Some(after) = self.after_time {
            params.push(("after-time", after.to_rfc3339()));
        }
        if let Some(before) = self.before_time {
            params.push(("before-time", before.to_rfc3339()));
        }
        if let Some(round) = self.min_round {
            params.push(("min-round", round.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}

/// One (possibly multi-request) search result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPage {
    pub transactions: Vec<TransactionRecord>,
    /// Indexer head at query time
    pub current_round: Option<u64>,
    /// More results existed than the page limit allowed us to fetch
    pub truncated: bool,
}

impl TransactionPage {
    pub fn new(transactions: Vec<TransactionRecord>) -> Self {
        Self {
            transactions,
            current_round: None,
            truncated: false,
        }
    }

    pub fn with_current_round(mut self, round: u64) -> Self {
        self.current_round = Some(round);
        self
    }

    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }
}

/// Asset created by an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedAsset {
    pub index: u64,
    pub creator: String,
    pub name: Option<String>,
    pub unit_name: Option<String>,
    pub total: u64,
    pub decimals: u32,
    pub url: Option<String>,
    pub deleted: bool,
}

/// Records delivered by one poll cycle, oldest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaBatch {
    pub subscription_id: SubscriptionId,
    pub records: Vec<TransactionRecord>,
    /// Position the subscription advanced to with this batch
    pub watermark: Watermark,
    pub produced_at: DateTime<Utc>,
}

impl DeltaBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded { consecutive_failures: u32 },
}

/// Raised to the manager when a subscription degrades or recovers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSignal {
    pub subscription_id: SubscriptionId,
    pub status: HealthStatus,
    pub at: DateTime<Utc>,
}

/// Everything an observer of one subscription can receive
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubscriptionEvent {
    Delta(DeltaBatch),
    /// Non-fatal; the same range is retried on the next cycle
    QueryFailed {
        subscription_id: SubscriptionId,
        error: String,
        consecutive_failures: u32,
    },
    Health(HealthSignal),
}
