//! Account lookup tests against the mock ledger

use algorand_monitor::adapters::MockLedgerClient;
use algorand_monitor::core::{
    CreatedAsset, MonitorError, TransactionPage, TransactionRecord, TransactionType, ValidationError,
};
use algorand_monitor::domain::{created_assets, interacted_accounts, Address, TimeFrame};
use anyhow::Result;
use chrono::{Duration, Utc};

fn address(seed: u8) -> Address {
    Address::from_public_key([seed; 32])
}

fn asset(index: u64, creator: &Address, unit: &str) -> CreatedAsset {
    CreatedAsset {
        index,
        creator: creator.to_string(),
        name: Some(format!("{} token", unit)),
        unit_name: Some(unit.to_string()),
        total: 1_000_000,
        decimals: 6,
        url: None,
        deleted: false,
    }
}

#[tokio::test]
async fn test_created_assets_sorted_by_index() -> Result<()> {
    let mock = MockLedgerClient::new();
    let creator = address(1);
    mock.set_created_assets(&creator, vec![asset(300, &creator, "C"), asset(31566704, &creator, "U"), asset(12, &creator, "A")]);

    let assets = created_assets(&mock, creator.as_str()).await?;
    let indexes: Vec<u64> = assets.iter().map(|a| a.index).collect();
    assert_eq!(indexes, vec![12, 300, 31566704]);

    assert!(created_assets(&mock, address(2).as_str()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_created_assets_rejects_bad_address() {
    let mock = MockLedgerClient::new();
    let result = created_assets(&mock, "not-an-address").await;
    assert!(matches!(
        result,
        Err(MonitorError::Validation(ValidationError::InvalidAddress { .. }))
    ));
}

#[tokio::test]
async fn test_interacted_accounts_within_frame() -> Result<()> {
    let mock = MockLedgerClient::new();
    let me = address(1);
    let now = Utc::now();

    let pay = |id: &str, from: &Address, to: &Address, age_days: i64| {
        TransactionRecord::new(id, TransactionType::Payment, from.to_string(), now - Duration::days(age_days))
            .with_receiver(to.to_string())
            .with_amount(1)
    };
    mock.push_transactions(vec![
        pay("recent", &me, &address(2), 1),
        pay("again", &me, &address(2), 2),
        pay("other", &me, &address(3), 3),
        pay("incoming", &address(4), &me, 1),
        pay("old", &me, &address(5), 20),
    ]);

    let receivers = interacted_accounts(&mock, me.as_str(), TimeFrame::Week).await?;
    let mut expected = vec![address(2).to_string(), address(3).to_string()];
    expected.sort();
    assert_eq!(receivers.accounts, expected);
    assert!(!receivers.truncated);

    let receivers = interacted_accounts(&mock, me.as_str(), TimeFrame::Month).await?;
    assert_eq!(receivers.accounts.len(), 3);

    let query = mock.queries().last().cloned().unwrap();
    assert_eq!(query.tx_type, Some(TransactionType::Payment));
    assert_eq!(query.address.as_deref(), Some(me.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_interacted_accounts_reports_partial_history() -> Result<()> {
    let mock = MockLedgerClient::new();
    let me = address(1);
    let now = Utc::now();

    // The indexer stopped paginating before the end of the year
    mock.push_page(
        TransactionPage::new(vec![
            TransactionRecord::new("p1", TransactionType::Payment, me.to_string(), now - Duration::days(2))
                .with_receiver(address(2).to_string())
                .with_amount(5),
            TransactionRecord::new("p2", TransactionType::Payment, me.to_string(), now - Duration::days(40))
                .with_receiver(address(3).to_string())
                .with_amount(5),
        ])
        .truncated(),
    );

    let receivers = interacted_accounts(&mock, me.as_str(), TimeFrame::Year).await?;
    assert!(receivers.truncated);
    assert_eq!(receivers.accounts.len(), 2);
    Ok(())
}
