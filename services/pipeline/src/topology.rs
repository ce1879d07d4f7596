//! Wires queues, topics, and consumers into a running broker.
//!
//! Queue graph:
//!
//! ```text
//!   new-image ──┬─> image-process ─(dead letter)─> bad-images
//!               ├─> metadata
//!               └─> review ──(republish)──> review-completed ──> mailer
//! ```
//!
//! Declaration order matters: a dead-letter target must exist before the
//! queue that redrives into it, and the review consumer holds a publisher
//! for `review-completed`, so the mailer queue is subscribed first.

use crate::config::Config;
use crate::handlers::{
    DeadLetterRemover, IngestionValidator, MetadataUpdater, ModerationUpdater, Notifier,
};
use crate::mailer::MailTransport;
use crate::object_store::ObjectStore;
use crate::record_store::RecordStore;
use photoflow_broker::{Broker, BrokerError, DeadLetterPolicy};
use std::sync::Arc;
use tracing::info;

pub const BAD_IMAGES_QUEUE: &str = "bad-images";
pub const IMAGE_PROCESS_QUEUE: &str = "image-process";
pub const METADATA_QUEUE: &str = "metadata";
pub const REVIEW_QUEUE: &str = "review";
pub const MAILER_QUEUE: &str = "mailer";

/// Build the full pipeline topology on a fresh broker.
pub fn build(
    config: &Config,
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    mailer: Arc<dyn MailTransport>,
) -> Result<Arc<Broker>, BrokerError> {
    let broker = Arc::new(Broker::new());
    let options = config.queue_options();

    broker.add_queue(
        BAD_IMAGES_QUEUE,
        options.clone(),
        Arc::new(DeadLetterRemover::new(objects)),
    )?;

    broker.add_queue(
        IMAGE_PROCESS_QUEUE,
        options.clone().with_dead_letter(DeadLetterPolicy {
            queue: BAD_IMAGES_QUEUE.to_string(),
            max_receive_count: config.broker.image_process_max_receive_count,
        }),
        Arc::new(IngestionValidator::new(records.clone())),
    )?;

    broker.add_queue(
        METADATA_QUEUE,
        options.clone(),
        Arc::new(MetadataUpdater::new(records.clone())),
    )?;

    broker.add_queue(MAILER_QUEUE, options.clone(), Arc::new(Notifier::new(mailer)))?;
    broker.subscribe(&config.topics.review_completed, MAILER_QUEUE)?;

    let completed = broker.publisher(&config.topics.review_completed)?;
    broker.add_queue(
        REVIEW_QUEUE,
        options,
        Arc::new(ModerationUpdater::new(records, completed)),
    )?;

    for queue in [IMAGE_PROCESS_QUEUE, METADATA_QUEUE, REVIEW_QUEUE] {
        broker.subscribe(&config.topics.new_image, queue)?;
    }

    info!(
        new_image = %config.topics.new_image,
        review_completed = %config.topics.review_completed,
        "pipeline topology ready"
    );

    Ok(broker)
}
