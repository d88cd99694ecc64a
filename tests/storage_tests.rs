//! Watermark store integration tests

use algorand_monitor::adapters::storage::{open_store, RocksDbWatermarkStore};
use algorand_monitor::config::{RocksDBConfig, StorageBackend, StorageConfig};
use algorand_monitor::core::{SubscriptionId, Watermark, WatermarkStore};
use anyhow::Result;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

fn rocksdb_config(temp_dir: &TempDir) -> RocksDBConfig {
    RocksDBConfig {
        path: temp_dir.path().to_path_buf(),
        enable_compression: true,
        max_open_files: 100,
    }
}

#[tokio::test]
async fn test_rocksdb_round_and_timestamp_positions() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = RocksDbWatermarkStore::open(&rocksdb_config(&temp_dir))?;

    let by_round = SubscriptionId::new();
    let by_time = SubscriptionId::new();
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    assert_eq!(store.get(&by_round).await?, None);

    store.set(&by_round, Watermark::Round(41_000_000)).await?;
    store.set(&by_time, Watermark::Timestamp(at)).await?;
    store.set(&by_round, Watermark::Round(41_000_010)).await?;

    assert_eq!(store.get(&by_round).await?, Some(Watermark::Round(41_000_010)));
    assert_eq!(store.get(&by_time).await?, Some(Watermark::Timestamp(at)));

    store.remove(&by_round).await?;
    assert_eq!(store.get(&by_round).await?, None);
    assert!(store.get(&by_time).await?.is_some());

    Ok(())
}

#[tokio::test]
async fn test_rocksdb_survives_reopen() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let id = SubscriptionId::new();

    {
        let store = RocksDbWatermarkStore::open(&rocksdb_config(&temp_dir))?;
        store.set(&id, Watermark::Round(7)).await?;
        store.flush()?;
    }

    let store = RocksDbWatermarkStore::open(&rocksdb_config(&temp_dir))?;
    assert_eq!(store.get(&id).await?, Some(Watermark::Round(7)));
    Ok(())
}

#[tokio::test]
async fn test_open_store_by_backend() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let id = SubscriptionId::new();

    let memory = open_store(&StorageConfig::default())?;
    memory.set(&id, Watermark::Round(3)).await?;
    assert_eq!(memory.get(&id).await?, Some(Watermark::Round(3)));

    let config = StorageConfig {
        backend: StorageBackend::Rocksdb,
        rocksdb: rocksdb_config(&temp_dir),
    };
    let durable = open_store(&config)?;
    assert_eq!(durable.get(&id).await?, None);
    Ok(())
}
