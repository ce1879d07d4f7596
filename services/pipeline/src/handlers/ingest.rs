//! Ingestion validator: logs accepted uploads into the record store.
//!
//! Bound to the `image-process` queue. A disallowed file extension is a
//! deliberate processing failure, not a skip: with the queue's
//! single-attempt dead-letter policy it routes the notification straight
//! to the cleanup path.

use crate::events::{base_file_name, decode_object_key, file_extension, UploadNotification};
use crate::record_store::RecordStore;
use photoflow_broker::{BatchHandler, Envelope, HandlerError};
use std::sync::Arc;
use tracing::{info, warn};

/// Extensions the pipeline accepts, lowercased, without the dot.
const ACCEPTED_EXTENSIONS: [&str; 2] = ["jpeg", "png"];

pub struct IngestionValidator {
    records: Arc<dyn RecordStore>,
}

impl IngestionValidator {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait::async_trait]
impl BatchHandler for IngestionValidator {
    async fn handle(&self, batch: &[Envelope]) -> Result<(), HandlerError> {
        for envelope in batch {
            let notification: UploadNotification = match envelope.decode_json() {
                Ok(notification) => notification,
                Err(_) => {
                    info!(
                        message_id = %envelope.message_id,
                        "message is not an upload notification, ignoring"
                    );
                    continue;
                }
            };

            let src_key = decode_object_key(&notification.object_key);
            let file_name = base_file_name(&src_key);
            let extension = file_extension(file_name);

            let accepted = extension
                .as_deref()
                .is_some_and(|ext| ACCEPTED_EXTENSIONS.contains(&ext));
            if !accepted {
                warn!(
                    file_name = %file_name,
                    extension = ?extension,
                    "invalid file type"
                );
                return Err(HandlerError::Unsupported(format!(
                    "unsupported file extension for {file_name}"
                )));
            }

            self.records
                .put(file_name)
                .await
                .map_err(|e| HandlerError::Other(e.into()))?;

            metrics::counter!("pipeline.records.logged").increment(1);
            info!(file_name = %file_name, "logged image record");
        }
        Ok(())
    }
}
