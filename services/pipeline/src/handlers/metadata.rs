//! Metadata updater: applies one whitelisted attribute to a record.
//!
//! Bound to the `metadata` queue. The attribute kind travels in the
//! `metadata_type` envelope attribute; anything missing or outside the
//! whitelist is discarded without failing the batch.

use crate::events::{MetadataKind, MetadataUpdate, METADATA_TYPE_ATTRIBUTE};
use crate::record_store::{RecordPatch, RecordStore};
use photoflow_broker::{BatchHandler, Envelope, HandlerError};
use std::sync::Arc;
use tracing::info;

pub struct MetadataUpdater {
    records: Arc<dyn RecordStore>,
}

impl MetadataUpdater {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait::async_trait]
impl BatchHandler for MetadataUpdater {
    async fn handle(&self, batch: &[Envelope]) -> Result<(), HandlerError> {
        for envelope in batch {
            let update: MetadataUpdate = match envelope.decode_json() {
                Ok(update) => update,
                Err(_) => {
                    info!(
                        message_id = %envelope.message_id,
                        "skipping message due to missing fields"
                    );
                    continue;
                }
            };

            if update.id.is_empty() || update.value.is_empty() {
                info!(
                    message_id = %envelope.message_id,
                    "skipping message due to empty fields"
                );
                continue;
            }

            let Some(raw_kind) = envelope.attribute(METADATA_TYPE_ATTRIBUTE) else {
                info!(
                    message_id = %envelope.message_id,
                    "skipping message due to missing metadata_type attribute"
                );
                continue;
            };

            let Some(kind) = MetadataKind::parse(raw_kind) else {
                info!(metadata_type = %raw_kind, "invalid metadata_type, skipping");
                continue;
            };

            self.records
                .update(&update.id, RecordPatch::metadata(kind, update.value.clone()))
                .await
                .map_err(|e| HandlerError::Other(e.into()))?;

            metrics::counter!("pipeline.metadata.applied").increment(1);
            info!(
                id = %update.id,
                metadata_type = %kind,
                value = %update.value,
                "updated record metadata"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_store::MemoryRecordStore;
    use std::collections::HashMap;

    fn metadata_envelope(id: &str, value: &str, kind: Option<&str>) -> Envelope {
        let payload = serde_json::to_vec(&MetadataUpdate {
            id: id.to_string(),
            value: value.to_string(),
        })
        .unwrap();
        let mut attributes = HashMap::new();
        if let Some(kind) = kind {
            attributes.insert(METADATA_TYPE_ATTRIBUTE.to_string(), kind.to_string());
        }
        Envelope::new(payload, attributes)
    }

    async fn store_with_record(file_name: &str) -> Arc<MemoryRecordStore> {
        let store = Arc::new(MemoryRecordStore::new("images"));
        store.put(file_name).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_caption_update_touches_only_caption() {
        let store = store_with_record("a.png").await;
        let handler = MetadataUpdater::new(store.clone());

        handler
            .handle(&[metadata_envelope("a.png", "sunset", Some("Caption"))])
            .await
            .unwrap();

        let record = store.get("a.png").await.unwrap().unwrap();
        assert_eq!(record.caption.as_deref(), Some("sunset"));
        assert!(record.date.is_none());
        assert!(record.name.is_none());
        assert!(record.status.is_none());
    }

    #[tokio::test]
    async fn test_non_whitelisted_attribute_is_rejected() {
        let store = store_with_record("a.png").await;
        let handler = MetadataUpdater::new(store.clone());

        handler
            .handle(&[metadata_envelope("a.png", "eve", Some("owner"))])
            .await
            .unwrap();

        let record = store.get("a.png").await.unwrap().unwrap();
        assert_eq!(record, crate::record_store::ImageRecord {
            file_name: "a.png".to_string(),
            ..Default::default()
        });
    }

    #[tokio::test]
    async fn test_missing_attribute_is_skipped() {
        let store = store_with_record("a.png").await;
        let handler = MetadataUpdater::new(store.clone());

        handler
            .handle(&[metadata_envelope("a.png", "sunset", None)])
            .await
            .unwrap();

        let record = store.get("a.png").await.unwrap().unwrap();
        assert!(record.caption.is_none());
    }

    #[tokio::test]
    async fn test_store_outage_fails_the_batch() {
        let store = store_with_record("a.png").await;
        store.set_failing(true);
        let handler = MetadataUpdater::new(store.clone());

        // A transient store failure must escape so the broker redelivers.
        let err = handler
            .handle(&[metadata_envelope("a.png", "sunset", Some("Caption"))])
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Other(_)));
    }

    #[tokio::test]
    async fn test_update_for_absent_record_creates_nothing() {
        let store = Arc::new(MemoryRecordStore::new("images"));
        let handler = MetadataUpdater::new(store.clone());

        handler
            .handle(&[metadata_envelope("ghost.png", "sunset", Some("Caption"))])
            .await
            .unwrap();

        assert!(store.get("ghost.png").await.unwrap().is_none());
    }
}
