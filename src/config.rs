//! Configuration management for the monitor

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::core::{SubscriptionKind, WatermarkMode};
use crate::domain::FilterInput;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct MonitorConfig {
    #[validate]
    pub indexer: IndexerConfig,
    #[validate]
    pub engine: EngineSettings,
    #[validate]
    pub storage: StorageConfig,
    pub monitoring: MonitoringConfig,
    #[validate]
    pub subscriptions: Vec<SubscriptionConfig>,
}

/// Public indexer deployments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
}

impl Network {
    pub fn default_indexer_endpoint(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://mainnet-idx.algonode.cloud",
            Network::Testnet => "https://testnet-idx.algonode.cloud",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct IndexerConfig {
    pub network: Network,
    /// Overrides the network preset
    #[validate(url)]
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    #[validate(range(min = 1, max = 120))]
    pub request_timeout_secs: u64,
    #[validate(range(min = 1, max = 1000))]
    pub page_limit: u32,
    #[validate(range(min = 1, max = 100))]
    pub max_pages_per_cycle: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineSettings {
    #[validate(range(min = 1, max = 3600))]
    pub default_poll_interval_secs: u64,
    #[validate(range(min = 1, max = 100000))]
    pub seen_capacity: usize,
    #[validate(range(max = 300))]
    pub overlap_secs: u64,
    #[validate(range(max = 1000))]
    pub overlap_rounds: u64,
    #[validate(range(min = 1, max = 100))]
    pub degraded_after_failures: u32,
    #[validate(range(min = 1, max = 65536))]
    pub event_buffer: usize,
    pub watermark_mode: WatermarkMode,
    #[validate(range(min = 1, max = 120))]
    pub query_timeout_secs: u64,
    #[validate(range(min = 1, max = 300))]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Rocksdb,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[validate]
    pub rocksdb: RocksDBConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RocksDBConfig {
    pub path: PathBuf,
    pub enable_compression: bool,
    #[validate(range(min = 16, max = 10000))]
    pub max_open_files: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub structured_logging: bool,
}

/// A subscription declared in the config file, created at startup
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubscriptionConfig {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    pub kind: SubscriptionKind,
    pub address: Option<String>,
    pub application_id: Option<u64>,
    pub asset_id: Option<u64>,
    pub transaction_type: Option<String>,
    pub min_amount: Option<u64>,
    #[validate(range(min = 1, max = 3600))]
    pub poll_interval_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub start: bool,
}

fn default_true() -> bool {
    true
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            endpoint: None,
            api_token: None,
            request_timeout_secs: 10,
            page_limit: 1000,
            max_pages_per_cycle: 10,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_poll_interval_secs: 5,
            seen_capacity: crate::domain::DEFAULT_SEEN_CAPACITY,
            overlap_secs: 5,
            overlap_rounds: 2,
            degraded_after_failures: 3,
            event_buffer: 256,
            watermark_mode: WatermarkMode::Timestamp,
            query_timeout_secs: 15,
            shutdown_timeout_secs: 5,
        }
    }
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            path: "./data/watermarks".into(),
            enable_compression: true,
            max_open_files: 256,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            structured_logging: false,
        }
    }
}

impl IndexerConfig {
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.network.default_indexer_endpoint())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl EngineSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn overlap(&self) -> Duration {
        Duration::from_secs(self.overlap_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl SubscriptionConfig {
    /// Raw filter parameters, validated later by the manager
    pub fn filter_input(&self) -> FilterInput {
        FilterInput {
            transaction_type: self.transaction_type.clone(),
            address: self.address.clone(),
            min_amount: self.min_amount.map(|v| v.to_string()),
            asset_id: self.asset_id.map(|v| v.to_string()),
            application_id: self.application_id.map(|v| v.to_string()),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Ensure required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::Rocksdb {
            std::fs::create_dir_all(&self.storage.rocksdb.path)?;
        }
        Ok(())
    }

    /// Validate configuration: declared ranges plus cross-field checks
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)?;

        if self.engine.query_timeout_secs < self.indexer.request_timeout_secs {
            return Err(anyhow::anyhow!(
                "engine.query_timeout_secs ({}) must not be shorter than indexer.request_timeout_secs ({})",
                self.engine.query_timeout_secs,
                self.indexer.request_timeout_secs
            ));
        }

        let mut names = std::collections::HashSet::new();
        for sub in &self.subscriptions {
            if !names.insert(sub.name.as_str()) {
                return Err(anyhow::anyhow!("Duplicate subscription name: {}", sub.name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.indexer.endpoint(), "https://testnet-idx.algonode.cloud");
        assert_eq!(config.engine.seen_capacity, 200);
        assert_eq!(config.engine.degraded_after_failures, 3);
    }

    #[test]
    fn test_endpoint_override() {
        let config = MonitorConfig::from_toml(
            r#"
[indexer]
network = "mainnet"
endpoint = "http://localhost:8980"
"#,
        )
        .unwrap();
        assert_eq!(config.indexer.network, Network::Mainnet);
        assert_eq!(config.indexer.endpoint(), "http://localhost:8980");
    }

    #[test]
    fn test_rejects_out_of_range() {
        let result = MonitorConfig::from_toml(
            r#"
[engine]
seen_capacity = 0
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_short_query_timeout() {
        let mut config = MonitorConfig::default();
        config.engine.query_timeout_secs = 2;
        config.indexer.request_timeout_secs = 10;
        assert!(config.validate().is_err());
    }
}
