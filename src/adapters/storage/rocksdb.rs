//! RocksDB-backed watermark store

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RocksDBConfig;
use crate::core::{MonitorResult, StorageError, SubscriptionId, Watermark, WatermarkStore};

/// Column family names
pub struct ColumnFamilies;

impl ColumnFamilies {
    pub const WATERMARKS: &'static str = "watermarks";
}

/// Persisted form of one subscription's position
#[derive(Debug, Serialize, Deserialize)]
struct WatermarkRecord {
    subscription_id: SubscriptionId,
    position: Watermark,
}

/// Durable watermark store. Named subscriptions keep their id across runs
/// and resume from the position stored here.
pub struct RocksDbWatermarkStore {
    db: Arc<DB>,
}

impl RocksDbWatermarkStore {
    /// Open RocksDB with the specified configuration
    pub fn open(config: &RocksDBConfig) -> MonitorResult<Self> {
        let path = &config.path;

        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::RocksDB(e.to_string()))?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);

        if config.enable_compression {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let cfs = vec![ColumnFamilyDescriptor::new(
            ColumnFamilies::WATERMARKS,
            Options::default(),
        )];

        let db = DB::open_cf_descriptors(&opts, path, cfs).map_err(StorageError::from)?;

        info!("Watermark store opened at: {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    fn put_record(&self, record: &WatermarkRecord) -> Result<(), StorageError> {
        let cf = self.db.cf_handle(ColumnFamilies::WATERMARKS).ok_or_else(|| {
            StorageError::RocksDB(format!("Column family not found: {}", ColumnFamilies::WATERMARKS))
        })?;

        let serialized = serde_json::to_vec(record)?;
        self.db
            .put_cf(&cf, record.subscription_id.as_uuid().as_bytes(), serialized)?;

        debug!("Persisted watermark for {}: {}", record.subscription_id, record.position);
        Ok(())
    }

    fn get_record(&self, id: &SubscriptionId) -> Result<Option<WatermarkRecord>, StorageError> {
        let cf = self.db.cf_handle(ColumnFamilies::WATERMARKS).ok_or_else(|| {
            StorageError::RocksDB(format!("Column family not found: {}", ColumnFamilies::WATERMARKS))
        })?;

        match self.db.get_cf(&cf, id.as_uuid().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn delete_record(&self, id: &SubscriptionId) -> Result<(), StorageError> {
        let cf = self.db.cf_handle(ColumnFamilies::WATERMARKS).ok_or_else(|| {
            StorageError::RocksDB(format!("Column family not found: {}", ColumnFamilies::WATERMARKS))
        })?;

        self.db.delete_cf(&cf, id.as_uuid().as_bytes())?;
        Ok(())
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> MonitorResult<()> {
        self.db.flush().map_err(StorageError::from)?;
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for RocksDbWatermarkStore {
    async fn get(&self, id: &SubscriptionId) -> MonitorResult<Option<Watermark>> {
        Ok(self.get_record(id)?.map(|record| record.position))
    }

    async fn set(&self, id: &SubscriptionId, watermark: Watermark) -> MonitorResult<()> {
        self.put_record(&WatermarkRecord {
            subscription_id: *id,
            position: watermark,
        })?;
        Ok(())
    }

    async fn remove(&self, id: &SubscriptionId) -> MonitorResult<()> {
        self.delete_record(id)?;
        Ok(())
    }
}
