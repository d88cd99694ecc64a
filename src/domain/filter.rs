//! Filter predicates
//!
//! A [`Filter`] is validated once from raw user input and never mutated.
//! Every field that is set must hold (conjunction); consumers needing OR
//! semantics register several subscriptions.

use serde::{Deserialize, Serialize};

use super::address::Address;
use crate::core::{
    SubscriptionKind, TransactionQuery, TransactionRecord, TransactionType, ValidationError,
};

/// Raw filter parameters as typed by a user, validated by [`Filter::from_input`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterInput {
    pub transaction_type: Option<String>,
    pub address: Option<String>,
    pub min_amount: Option<String>,
    pub asset_id: Option<String>,
    pub application_id: Option<String>,
}

impl FilterInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transaction_type(mut self, tx_type: impl Into<String>) -> Self {
        self.transaction_type = Some(tx_type.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_min_amount(mut self, amount: impl Into<String>) -> Self {
        self.min_amount = Some(amount.into());
        self
    }

    pub fn with_asset_id(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }
}

/// Validated, immutable description of what a subscription accepts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Filter {
    pub transaction_type: Option<TransactionType>,
    /// Matched against sender or receiver
    pub counterparty: Option<Address>,
    /// Base units, inclusive
    pub min_amount: Option<u64>,
    pub asset_id: Option<u64>,
    pub application_id: Option<u64>,
    /// Accept only asset configurations that created an asset
    pub creations_only: bool,
}

impl Filter {
    /// Validate raw input and apply the per-kind defaults
    pub fn from_input(kind: SubscriptionKind, input: &FilterInput) -> Result<Self, ValidationError> {
        let transaction_type = non_empty(&input.transaction_type)
            .map(str::parse::<TransactionType>)
            .transpose()?;
        let counterparty = non_empty(&input.address)
            .map(str::parse::<Address>)
            .transpose()?;
        let min_amount = non_empty(&input.min_amount)
            .map(|raw| {
                raw.parse::<u64>()
                    .map_err(|_| ValidationError::InvalidAmount(raw.to_string()))
            })
            .transpose()?;
        let asset_id = non_empty(&input.asset_id)
            .map(|raw| parse_id("asset id", raw))
            .transpose()?;
        let application_id = non_empty(&input.application_id)
            .map(|raw| parse_id("application id", raw))
            .transpose()?;

        let mut filter = Filter {
            transaction_type,
            counterparty,
            min_amount,
            asset_id,
            application_id,
            creations_only: false,
        };

        match kind {
            SubscriptionKind::Wallet => {
                if filter.counterparty.is_none() {
                    return Err(ValidationError::MissingField {
                        kind: "wallet",
                        field: "an address",
                    });
                }
            }
            SubscriptionKind::Contract => {
                if filter.application_id.is_none() {
                    return Err(ValidationError::MissingField {
                        kind: "contract",
                        field: "an application id",
                    });
                }
                filter
                    .transaction_type
                    .get_or_insert(TransactionType::ApplicationCall);
            }
            SubscriptionKind::Asset => match (&filter.counterparty, filter.asset_id) {
                (None, None) => {
                    return Err(ValidationError::MissingField {
                        kind: "asset",
                        field: "a creator address or an asset id",
                    });
                }
                (Some(_), None) => {
                    // Without an explicit type this watches the assets the account creates
                    if filter.transaction_type.is_none() {
                        filter.transaction_type = Some(TransactionType::AssetConfig);
                        filter.creations_only = true;
                    }
                }
                (_, Some(_)) => {
                    filter.transaction_type.get_or_insert(TransactionType::AssetTransfer);
                }
            },
        }

        Ok(filter)
    }

    pub fn with_transaction_type(mut self, tx_type: TransactionType) -> Self {
        self.transaction_type = Some(tx_type);
        self
    }

    pub fn with_counterparty(mut self, address: Address) -> Self {
        self.counterparty = Some(address);
        self
    }

    pub fn with_min_amount(mut self, amount: u64) -> Self {
        self.min_amount = Some(amount);
        self
    }

    pub fn with_asset_id(mut self, asset_id: u64) -> Self {
        self.asset_id = Some(asset_id);
        self
    }

    pub fn with_application_id(mut self, application_id: u64) -> Self {
        self.application_id = Some(application_id);
        self
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        matches(record, self)
    }

    /// Indexer query narrowing as much as the indexer supports.
    /// Results are still checked with [`matches`].
    pub fn to_query(&self) -> TransactionQuery {
        let mut query = TransactionQuery::new();
        query.address = self.counterparty.as_ref().map(|a| a.to_string());
        query.tx_type = self.transaction_type.clone();
        query.asset_id = self.asset_id;
        query.application_id = self.application_id;

        // currency-greater-than is exclusive and only meaningful for amount-carrying types
        let amount_type = self
            .transaction_type
            .as_ref()
            .is_some_and(TransactionType::carries_amount);
        if let Some(min) = self.min_amount.filter(|&m| m > 0) {
            if amount_type || self.asset_id.is_some() {
                query.currency_greater_than = Some(min - 1);
            }
        }
        query
    }
}

/// Pure, total predicate: does `record` belong to a subscription with `filter`?
pub fn matches(record: &TransactionRecord, filter: &Filter) -> bool {
    if let Some(tx_type) = &filter.transaction_type {
        if &record.tx_type != tx_type {
            return false;
        }
    }

    if let Some(address) = &filter.counterparty {
        let address = address.as_str();
        let involved = record.sender == address || record.receiver.as_deref() == Some(address);
        if !involved {
            return false;
        }
    }

    if let Some(min) = filter.min_amount {
        match record.amount {
            Some(amount) if amount >= min => {}
            _ => return false,
        }
    }

    if let Some(asset_id) = filter.asset_id {
        if record.asset_id != Some(asset_id) {
            return false;
        }
    }

    if let Some(app_id) = filter.application_id {
        if record.application_id != Some(app_id) {
            return false;
        }
    }

    if filter.creations_only && !record.creates_asset {
        return false;
    }

    true
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_id(field: &'static str, raw: &str) -> Result<u64, ValidationError> {
    match raw.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::InvalidId {
            field,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn address(seed: u8) -> Address {
        Address::from_public_key([seed; 32])
    }

    fn payment(id: &str, from: &Address, to: &Address, amount: u64) -> TransactionRecord {
        TransactionRecord::new(
            id,
            TransactionType::Payment,
            from.as_str(),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
        .with_receiver(to.as_str())
        .with_amount(amount)
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let record = payment("tx1", &address(1), &address(2), 5);
        assert!(Filter::default().matches(&record));
    }

    #[test]
    fn test_min_amount_threshold() {
        let filter = Filter::default().with_min_amount(1_000_000);
        let (a, b) = (address(1), address(2));
        let amounts = [500_000u64, 1_000_000, 2_000_000];

        let accepted: Vec<u64> = amounts
            .iter()
            .map(|&amount| payment(&format!("tx{}", amount), &a, &b, amount))
            .filter(|r| filter.matches(r))
            .filter_map(|r| r.amount)
            .collect();

        assert_eq!(accepted, vec![1_000_000, 2_000_000]);
    }

    #[test]
    fn test_counterparty_is_directionless() {
        let (watched, other) = (address(1), address(2));
        let filter = Filter::default().with_counterparty(watched.clone());

        assert!(filter.matches(&payment("out", &watched, &other, 1)));
        assert!(filter.matches(&payment("in", &other, &watched, 1)));
        assert!(!filter.matches(&payment("unrelated", &other, &address(3), 1)));
    }

    #[test]
    fn test_missing_fields_never_match() {
        let app_call = TransactionRecord::new(
            "app",
            TransactionType::ApplicationCall,
            address(1).as_str(),
            Utc::now(),
        )
        .with_application(7);

        assert!(!Filter::default().with_asset_id(31566704).matches(&app_call));
        assert!(!Filter::default().with_min_amount(1).matches(&app_call));
        assert!(Filter::default().with_application_id(7).matches(&app_call));
        assert!(!Filter::default().with_application_id(8).matches(&app_call));
    }

    #[test]
    fn test_conjunction() {
        let (a, b) = (address(1), address(2));
        let filter = Filter::default()
            .with_transaction_type(TransactionType::Payment)
            .with_counterparty(a.clone())
            .with_min_amount(10);

        assert!(filter.matches(&payment("ok", &a, &b, 10)));
        assert!(!filter.matches(&payment("small", &a, &b, 9)));

        let transfer = payment("axfer", &a, &b, 100);
        let transfer = TransactionRecord {
            tx_type: TransactionType::AssetTransfer,
            ..transfer
        };
        assert!(!filter.matches(&transfer));
    }

    #[test]
    fn test_matches_is_deterministic() {
        let filter = Filter::default().with_min_amount(3);
        let record = payment("tx", &address(1), &address(2), 3);
        let first = matches(&record, &filter);
        for _ in 0..10 {
            assert_eq!(matches(&record, &filter), first);
        }
    }

    #[test]
    fn test_kind_defaults() {
        let creator = address(9).to_string();

        let contract = Filter::from_input(
            SubscriptionKind::Contract,
            &FilterInput::new().with_application_id("1284326447"),
        )
        .unwrap();
        assert_eq!(contract.transaction_type, Some(TransactionType::ApplicationCall));
        assert_eq!(contract.application_id, Some(1284326447));

        let created = Filter::from_input(
            SubscriptionKind::Asset,
            &FilterInput::new().with_address(creator.clone()),
        )
        .unwrap();
        assert_eq!(created.transaction_type, Some(TransactionType::AssetConfig));
        assert!(created.creations_only);

        let any_config = Filter::from_input(
            SubscriptionKind::Asset,
            &FilterInput::new().with_address(creator.clone()).with_transaction_type("acfg"),
        )
        .unwrap();
        assert!(!any_config.creations_only);

        let transfers = Filter::from_input(
            SubscriptionKind::Asset,
            &FilterInput::new().with_asset_id("31566704"),
        )
        .unwrap();
        assert_eq!(transfers.transaction_type, Some(TransactionType::AssetTransfer));
    }

    #[test]
    fn test_creator_filter_skips_reconfiguration() {
        let creator = address(9);
        let filter = Filter::from_input(
            SubscriptionKind::Asset,
            &FilterInput::new().with_address(creator.to_string()),
        )
        .unwrap();

        let config = |id: &str| {
            TransactionRecord::new(id, TransactionType::AssetConfig, creator.as_str(), Utc::now())
        };
        assert!(filter.matches(&config("create").creating_asset(99)));
        assert!(!filter.matches(&config("reconfigure").with_asset(99)));
        assert!(!filter.matches(&config("destroy").with_asset(31566704)));
    }

    #[test]
    fn test_input_validation() {
        let wallet = |input: FilterInput| Filter::from_input(SubscriptionKind::Wallet, &input);

        assert!(matches!(
            wallet(FilterInput::new()),
            Err(ValidationError::MissingField { kind: "wallet", .. })
        ));
        assert!(matches!(
            wallet(FilterInput::new().with_address("NOTANADDRESS")),
            Err(ValidationError::InvalidAddress { .. })
        ));

        let valid = address(4).to_string();
        assert!(matches!(
            wallet(FilterInput::new().with_address(valid.clone()).with_min_amount("1.5")),
            Err(ValidationError::InvalidAmount(_))
        ));
        assert!(matches!(
            wallet(FilterInput::new().with_address(valid.clone()).with_asset_id("0")),
            Err(ValidationError::InvalidId { field: "asset id", .. })
        ));
        assert!(matches!(
            wallet(FilterInput::new().with_address(valid.clone()).with_transaction_type("xfer")),
            Err(ValidationError::UnknownTransactionType(_))
        ));

        let ok = wallet(FilterInput::new().with_address(format!("  {}  ", valid)).with_min_amount(""))
            .unwrap();
        assert_eq!(ok.min_amount, None);
    }

    #[test]
    fn test_query_pushdown() {
        let filter = Filter::default()
            .with_transaction_type(TransactionType::Payment)
            .with_counterparty(address(1))
            .with_min_amount(1_000_000);
        let query = filter.to_query();
        assert_eq!(query.currency_greater_than, Some(999_999));
        assert_eq!(query.address.as_deref(), Some(address(1).as_str()));

        let app = Filter::default().with_application_id(5).with_min_amount(10);
        assert_eq!(app.to_query().currency_greater_than, None);
    }
}
