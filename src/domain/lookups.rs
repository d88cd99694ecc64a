//! One-shot account lookups that sit beside the subscription engine:
//! assets an account created, and accounts it has paid recently.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::address::Address;
use crate::core::{
    CreatedAsset, LedgerQueryPort, MonitorResult, TransactionQuery, TransactionType,
    ValidationError,
};

/// How far back an account lookup reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrame {
    Day,
    #[default]
    Week,
    Month,
    Year,
}

impl TimeFrame {
    /// Start of the window ending at `now`
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = match self {
            TimeFrame::Day => now.checked_sub_signed(Duration::days(1)),
            TimeFrame::Week => now.checked_sub_signed(Duration::weeks(1)),
            TimeFrame::Month => now.checked_sub_months(Months::new(1)),
            TimeFrame::Year => now.checked_sub_months(Months::new(12)),
        };
        start.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl FromStr for TimeFrame {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(TimeFrame::Day),
            "week" => Ok(TimeFrame::Week),
            "month" => Ok(TimeFrame::Month),
            "year" => Ok(TimeFrame::Year),
            _ => Err(ValidationError::InvalidTimeFrame(s.to_string())),
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeFrame::Day => write!(f, "day"),
            TimeFrame::Week => write!(f, "week"),
            TimeFrame::Month => write!(f, "month"),
            TimeFrame::Year => write!(f, "year"),
        }
    }
}

/// Accounts paid by one address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Receivers {
    /// Sorted, unique
    pub accounts: Vec<String>,
    /// The indexer had more history than one lookup fetches; `accounts` is partial
    pub truncated: bool,
}

/// Assets created by `address`
pub async fn created_assets(
    client: &dyn LedgerQueryPort,
    address: &str,
) -> MonitorResult<Vec<CreatedAsset>> {
    let address: Address = address.parse()?;
    let mut assets = client.created_assets(&address).await?;
    assets.sort_by_key(|asset| asset.index);
    debug!("{} created {} assets", address.short(), assets.len());
    Ok(assets)
}

/// Unique receivers of payments sent by `address` within `frame`
pub async fn interacted_accounts(
    client: &dyn LedgerQueryPort,
    address: &str,
    frame: TimeFrame,
) -> MonitorResult<Receivers> {
    let address: Address = address.parse()?;
    let query = TransactionQuery::new()
        .with_tx_type(TransactionType::Payment)
        .with_after_time(frame.start(Utc::now()));

    let page = client.account_transactions(&address, &query).await?;
    let truncated = page.truncated;
    if truncated {
        warn!(
            "Payment history of {} over the last {} exceeds the page budget; receivers are partial",
            address.short(),
            frame
        );
    }
    let receivers: BTreeSet<String> = page
        .transactions
        .into_iter()
        .filter(|tx| tx.sender == address.as_str())
        .filter_map(|tx| tx.receiver)
        .filter(|receiver| !receiver.is_empty())
        .collect();

    debug!(
        "{} paid {} distinct accounts in the last {}",
        address.short(),
        receivers.len(),
        frame
    );
    Ok(Receivers {
        accounts: receivers.into_iter().collect(),
        truncated,
    })
}
