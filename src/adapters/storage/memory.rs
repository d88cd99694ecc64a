//! Process-local watermark store

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::core::{MonitorResult, SubscriptionId, Watermark, WatermarkStore};

/// Watermarks kept in memory; lost on restart
#[derive(Default)]
pub struct InMemoryWatermarkStore {
    watermarks: RwLock<HashMap<SubscriptionId, Watermark>>,
}

impl InMemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.watermarks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.watermarks.read().await.is_empty()
    }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
    async fn get(&self, id: &SubscriptionId) -> MonitorResult<Option<Watermark>> {
        Ok(self.watermarks.read().await.get(id).copied())
    }

    async fn set(&self, id: &SubscriptionId, watermark: Watermark) -> MonitorResult<()> {
        self.watermarks.write().await.insert(*id, watermark);
        Ok(())
    }

    async fn remove(&self, id: &SubscriptionId) -> MonitorResult<()> {
        self.watermarks.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_and_remove() {
        let store = InMemoryWatermarkStore::new();
        let id = SubscriptionId::new();

        assert_eq!(store.get(&id).await.unwrap(), None);
        store.set(&id, Watermark::Round(5)).await.unwrap();
        store.set(&id, Watermark::Round(9)).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(Watermark::Round(9)));

        store.remove(&id).await.unwrap();
        assert!(store.is_empty().await);
    }
}
