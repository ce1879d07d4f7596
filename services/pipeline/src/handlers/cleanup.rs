//! Dead-letter remover: deletes rejected uploads from the object store.
//!
//! Bound to the `bad-images` queue, which receives the original upload
//! notification after the ingestion validator has refused it. Touches only
//! the object store; any record-store state is left alone.

use crate::events::{decode_object_key, UploadNotification};
use crate::object_store::ObjectStore;
use photoflow_broker::{BatchHandler, Envelope, HandlerError};
use std::sync::Arc;
use tracing::info;

pub struct DeadLetterRemover {
    objects: Arc<dyn ObjectStore>,
}

impl DeadLetterRemover {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }
}

#[async_trait::async_trait]
impl BatchHandler for DeadLetterRemover {
    async fn handle(&self, batch: &[Envelope]) -> Result<(), HandlerError> {
        for envelope in batch {
            let notification: UploadNotification = match envelope.decode_json() {
                Ok(notification) => notification,
                Err(_) => {
                    info!(
                        message_id = %envelope.message_id,
                        "dead-letter message is not an upload notification, ignoring"
                    );
                    continue;
                }
            };

            let src_key = decode_object_key(&notification.object_key);
            info!(key = %src_key, "deleting rejected object");

            self.objects
                .delete(&src_key)
                .await
                .map_err(|e| HandlerError::Other(e.into()))?;

            metrics::counter!("pipeline.objects.removed").increment(1);
        }
        Ok(())
    }
}
