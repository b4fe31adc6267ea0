//! Local hints about opened positions.
//!
//! Side and collateral asset cannot always be recovered from chain state, so
//! they are written here at open time. Every record lives in one JSON list
//! under [`POSITION_METADATA_KEY`]. Reads never fail: a missing, unreadable
//! or corrupt list is an empty list.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::constants::POSITION_METADATA_KEY;
use crate::errors::EngineError;
use crate::execution::kv_store::KeyValueStore;
use crate::types::{ObjectId, PositionMetadataRecord};

#[derive(Clone)]
pub struct PositionMetadataStore {
    store: Arc<dyn KeyValueStore>,
}

impl PositionMetadataStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Every stored record. Degrades to empty on any failure.
    pub async fn all(&self) -> Vec<PositionMetadataRecord> {
        let raw = match self.store.get(POSITION_METADATA_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "position metadata unreadable, treating as empty");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "position metadata corrupt, treating as empty");
                Vec::new()
            }
        }
    }

    pub async fn get(&self, container_id: &ObjectId) -> Option<PositionMetadataRecord> {
        self.all()
            .await
            .into_iter()
            .find(|r| &r.container_id == container_id)
    }

    /// Insert or replace the record for its container. Last write wins.
    pub async fn put(&self, record: PositionMetadataRecord) -> Result<(), EngineError> {
        let mut records = self.all().await;
        records.retain(|r| r.container_id != record.container_id);
        debug!(container = %record.container_id.short(), side = record.side.as_str(), "storing position metadata");
        records.push(record);
        self.write(&records).await
    }

    pub async fn remove(&self, container_id: &ObjectId) -> Result<(), EngineError> {
        let mut records = self.all().await;
        let before = records.len();
        records.retain(|r| &r.container_id != container_id);
        if records.len() == before {
            return Ok(());
        }
        self.write(&records).await
    }

    async fn write(&self, records: &[PositionMetadataRecord]) -> Result<(), EngineError> {
        let json = serde_json::to_string(records)?;
        self.store.set(POSITION_METADATA_KEY, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::kv_store::MemoryStore;
    use crate::types::PositionSide;

    fn record(id: &str, side: PositionSide, collateral: &str) -> PositionMetadataRecord {
        PositionMetadataRecord {
            container_id: ObjectId::parse(id).unwrap(),
            pool_id: ObjectId::parse("0xa1").unwrap(),
            side,
            collateral_asset_symbol: collateral.into(),
            created_at: 1_700_000_000_000,
        }
    }

    fn store() -> (Arc<MemoryStore>, PositionMetadataStore) {
        let kv = Arc::new(MemoryStore::new());
        (kv.clone(), PositionMetadataStore::new(kv))
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let (_, meta) = store();
        meta.put(record("0xc1", PositionSide::Long, "USDC")).await.unwrap();
        meta.put(record("0xc2", PositionSide::Short, "SUI")).await.unwrap();

        let got = meta.get(&ObjectId::parse("0xc2").unwrap()).await.unwrap();
        assert_eq!(got.side, PositionSide::Short);
        assert_eq!(meta.all().await.len(), 2);

        meta.remove(&ObjectId::parse("0xc1").unwrap()).await.unwrap();
        assert_eq!(meta.all().await.len(), 1);
        assert!(meta.get(&ObjectId::parse("0xc1").unwrap()).await.is_none());
    }

    #[tokio::test]
    async fn test_put_is_last_write_wins() {
        let (_, meta) = store();
        meta.put(record("0xc1", PositionSide::Long, "USDC")).await.unwrap();
        meta.put(record("0xc1", PositionSide::Short, "SUI")).await.unwrap();

        let all = meta.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].side, PositionSide::Short);
        assert_eq!(all[0].collateral_asset_symbol, "SUI");
    }

    #[tokio::test]
    async fn test_corrupt_data_reads_as_empty() {
        let (kv, meta) = store();
        kv.set(POSITION_METADATA_KEY, "{\"oops\": true}").await.unwrap();
        assert!(meta.all().await.is_empty());

        // And a put repairs it.
        meta.put(record("0xc1", PositionSide::Long, "USDC")).await.unwrap();
        assert_eq!(meta.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_stored_format_is_camel_case_list() {
        let (kv, meta) = store();
        meta.put(record("0xc1", PositionSide::Long, "USDC")).await.unwrap();
        let raw = kv.get(POSITION_METADATA_KEY).await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["collateralAssetSymbol"], "USDC");
    }
}
