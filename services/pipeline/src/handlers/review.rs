//! Moderation updater: applies a review decision and republishes it.
//!
//! Bound to the `review` queue. A valid decision mutates the record's
//! status, reason, and review date in one atomic patch, then republishes a
//! completion event for the notifier. The store write and the publish are
//! two separate effects: a publish failure after a successful write
//! escapes the handler and the whole batch is redelivered.

use crate::events::{ReviewCompleted, ReviewUpdate};
use crate::record_store::{RecordPatch, RecordStore};
use photoflow_broker::{BatchHandler, Envelope, HandlerError, Publisher};
use std::sync::Arc;
use tracing::info;

pub struct ModerationUpdater {
    records: Arc<dyn RecordStore>,
    completed: Publisher,
}

impl ModerationUpdater {
    pub fn new(records: Arc<dyn RecordStore>, completed: Publisher) -> Self {
        Self { records, completed }
    }
}

#[async_trait::async_trait]
impl BatchHandler for ModerationUpdater {
    async fn handle(&self, batch: &[Envelope]) -> Result<(), HandlerError> {
        for envelope in batch {
            // An out-of-enum status fails deserialization here, so "Maybe"
            // and friends are discarded without touching the record.
            let review: ReviewUpdate = match envelope.decode_json() {
                Ok(review) => review,
                Err(_) => {
                    info!(
                        message_id = %envelope.message_id,
                        "skipping message due to missing or invalid fields"
                    );
                    continue;
                }
            };

            if review.id.is_empty() || review.update.reason.is_empty() {
                info!(
                    message_id = %envelope.message_id,
                    "skipping message due to empty fields"
                );
                continue;
            }

            self.records
                .update(
                    &review.id,
                    RecordPatch::review(
                        review.update.status,
                        review.update.reason.clone(),
                        review.date.clone(),
                    ),
                )
                .await
                .map_err(|e| HandlerError::Other(e.into()))?;

            let completed = ReviewCompleted {
                id: review.id.clone(),
                date: review.date.clone(),
                update: review.update.clone(),
            };
            self.completed
                .publish(&completed)
                .map_err(|e| HandlerError::Other(e.into()))?;

            metrics::counter!("pipeline.reviews.applied").increment(1);
            info!(
                id = %review.id,
                status = %review.update.status,
                reason = %review.update.reason,
                "updated record review status"
            );
        }
        Ok(())
    }
}
