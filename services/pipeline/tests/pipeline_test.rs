//! End-to-end tests driving events through the full broker topology.

use photoflow_pipeline::config::{
    BrokerConfig, Config, MailConfig, ServiceConfig, StorageConfig, StoreConfig, TopicConfig,
};
use photoflow_pipeline::events::{
    MetadataUpdate, ReviewOutcome, ReviewStatus, ReviewUpdate, UploadNotification,
    METADATA_TYPE_ATTRIBUTE,
};
use photoflow_pipeline::mailer::MemoryMailer;
use photoflow_pipeline::object_store::{MemoryObjectStore, ObjectStore};
use photoflow_pipeline::record_store::{MemoryRecordStore, RecordStore};
use photoflow_pipeline::topology;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Config with short batching windows so tests settle quickly.
fn fast_config() -> Config {
    Config {
        service: ServiceConfig::default(),
        broker: BrokerConfig {
            batch_size: 5,
            max_batch_wait_ms: 50,
            handler_timeout_secs: 2,
            retention_secs: 300,
            redelivery_delay_ms: 10,
            image_process_max_receive_count: 1,
        },
        store: StoreConfig {
            table: "images".to_string(),
        },
        storage: StorageConfig {
            bucket: "uploads".to_string(),
        },
        mail: MailConfig {
            from: "noreply@photoflow.dev".to_string(),
            to: "moderator@photoflow.dev".to_string(),
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            smtp_tls: true,
        },
        topics: TopicConfig::default(),
    }
}

struct Harness {
    config: Config,
    broker: Arc<photoflow_broker::Broker>,
    records: Arc<MemoryRecordStore>,
    objects: Arc<MemoryObjectStore>,
    mailer: Arc<MemoryMailer>,
}

fn harness() -> Harness {
    let config = fast_config();
    let records = Arc::new(MemoryRecordStore::new(&config.store.table));
    let objects = Arc::new(MemoryObjectStore::new(&config.storage.bucket));
    let mailer = Arc::new(MemoryMailer::new());
    let broker = topology::build(
        &config,
        records.clone(),
        objects.clone(),
        mailer.clone(),
    )
    .unwrap();
    Harness {
        config,
        broker,
        records,
        objects,
        mailer,
    }
}

/// Poll until `check` holds or two seconds elapse.
async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn upload(object_key: &str) -> UploadNotification {
    UploadNotification {
        file_name: object_key.rsplit('/').next().unwrap_or(object_key).to_string(),
        object_key: object_key.to_string(),
    }
}

#[tokio::test]
async fn test_accepted_upload_creates_record() {
    let h = harness();

    h.broker
        .publish(&h.config.topics.new_image, &upload("sunset.jpeg"))
        .unwrap();

    let records = h.records.clone();
    assert!(
        wait_until(|| {
            let records = records.clone();
            async move { records.get("sunset.jpeg").await.unwrap().is_some() }
        })
        .await
    );
    h.broker.shutdown();
}

#[tokio::test]
async fn test_rejected_upload_is_removed_from_storage() {
    let h = harness();
    h.objects.put("report.pdf", vec![0u8; 8]).await.unwrap();

    h.broker
        .publish(&h.config.topics.new_image, &upload("report.pdf"))
        .unwrap();

    // Failed validation dead-letters the notification after one attempt,
    // and the cleanup consumer deletes the object.
    let objects = h.objects.clone();
    assert!(
        wait_until(|| {
            let objects = objects.clone();
            async move { !objects.contains("report.pdf").await.unwrap() }
        })
        .await
    );
    assert!(h.records.get("report.pdf").await.unwrap().is_none());
    h.broker.shutdown();
}

#[tokio::test]
async fn test_duplicate_upload_preserves_existing_attributes() {
    let h = harness();

    h.broker
        .publish(&h.config.topics.new_image, &upload("sunset.jpeg"))
        .unwrap();
    let records = h.records.clone();
    wait_until(|| {
        let records = records.clone();
        async move { records.get("sunset.jpeg").await.unwrap().is_some() }
    })
    .await;

    let mut attributes = HashMap::new();
    attributes.insert(METADATA_TYPE_ATTRIBUTE.to_string(), "Caption".to_string());
    h.broker
        .publish_with_attributes(
            &h.config.topics.new_image,
            &MetadataUpdate {
                id: "sunset.jpeg".to_string(),
                value: "golden hour".to_string(),
            },
            attributes,
        )
        .unwrap();
    let records = h.records.clone();
    wait_until(|| {
        let records = records.clone();
        async move {
            records
                .get("sunset.jpeg")
                .await
                .unwrap()
                .is_some_and(|r| r.caption.is_some())
        }
    })
    .await;

    // Re-delivering the same upload must not wipe the caption.
    h.broker
        .publish(&h.config.topics.new_image, &upload("sunset.jpeg"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let record = h.records.get("sunset.jpeg").await.unwrap().unwrap();
    assert_eq!(record.caption.as_deref(), Some("golden hour"));
    h.broker.shutdown();
}

#[tokio::test]
async fn test_non_whitelisted_metadata_is_discarded() {
    let h = harness();

    h.broker
        .publish(&h.config.topics.new_image, &upload("sunset.jpeg"))
        .unwrap();
    let records = h.records.clone();
    wait_until(|| {
        let records = records.clone();
        async move { records.get("sunset.jpeg").await.unwrap().is_some() }
    })
    .await;

    let mut attributes = HashMap::new();
    attributes.insert(METADATA_TYPE_ATTRIBUTE.to_string(), "owner".to_string());
    h.broker
        .publish_with_attributes(
            &h.config.topics.new_image,
            &MetadataUpdate {
                id: "sunset.jpeg".to_string(),
                value: "eve".to_string(),
            },
            attributes,
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let record = h.records.get("sunset.jpeg").await.unwrap().unwrap();
    assert!(record.caption.is_none());
    assert!(record.name.is_none());
    h.broker.shutdown();
}

#[tokio::test]
async fn test_moderation_decision_patches_record_and_sends_mail() {
    let h = harness();

    h.broker
        .publish(&h.config.topics.new_image, &upload("sunset.jpeg"))
        .unwrap();
    let records = h.records.clone();
    wait_until(|| {
        let records = records.clone();
        async move { records.get("sunset.jpeg").await.unwrap().is_some() }
    })
    .await;

    h.broker
        .publish(
            &h.config.topics.new_image,
            &ReviewUpdate {
                id: "sunset.jpeg".to_string(),
                date: "2024-06-01T12:00:00Z".to_string(),
                update: ReviewOutcome {
                    status: ReviewStatus::Pass,
                    reason: "meets content guidelines".to_string(),
                },
            },
        )
        .unwrap();

    let mailer = h.mailer.clone();
    assert!(
        wait_until(|| {
            let mailer = mailer.clone();
            async move { !mailer.sent().is_empty() }
        })
        .await
    );

    let record = h.records.get("sunset.jpeg").await.unwrap().unwrap();
    assert_eq!(record.status, Some(ReviewStatus::Pass));
    assert_eq!(record.reason.as_deref(), Some("meets content guidelines"));
    assert_eq!(record.review_date.as_deref(), Some("2024-06-01T12:00:00Z"));

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.contains("sunset.jpeg"));
    assert!(sent[0].html_body.contains("<b>Status:</b> Pass"));
    assert!(sent[0].html_body.contains("meets content guidelines"));
    h.broker.shutdown();
}

#[tokio::test]
async fn test_invalid_status_has_no_effects() {
    let h = harness();

    h.broker
        .publish(&h.config.topics.new_image, &upload("sunset.jpeg"))
        .unwrap();
    let records = h.records.clone();
    wait_until(|| {
        let records = records.clone();
        async move { records.get("sunset.jpeg").await.unwrap().is_some() }
    })
    .await;

    h.broker
        .publish(
            &h.config.topics.new_image,
            &serde_json::json!({
                "id": "sunset.jpeg",
                "date": "2024-06-01T12:00:00Z",
                "update": {"status": "Maybe", "reason": "unsure"},
            }),
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let record = h.records.get("sunset.jpeg").await.unwrap().unwrap();
    assert!(record.status.is_none());
    assert!(h.mailer.sent().is_empty());
    h.broker.shutdown();
}

#[tokio::test]
async fn test_mail_outage_does_not_trigger_redelivery() {
    let h = harness();
    h.mailer.set_failing(true);

    h.broker
        .publish(&h.config.topics.new_image, &upload("sunset.jpeg"))
        .unwrap();
    let records = h.records.clone();
    wait_until(|| {
        let records = records.clone();
        async move { records.get("sunset.jpeg").await.unwrap().is_some() }
    })
    .await;

    h.broker
        .publish(
            &h.config.topics.new_image,
            &ReviewUpdate {
                id: "sunset.jpeg".to_string(),
                date: "2024-06-01T12:00:00Z".to_string(),
                update: ReviewOutcome {
                    status: ReviewStatus::Reject,
                    reason: "blurry".to_string(),
                },
            },
        )
        .unwrap();

    let mailer = h.mailer.clone();
    wait_until(|| {
        let mailer = mailer.clone();
        async move { mailer.attempts() > 0 }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The send failed once and was not retried.
    assert_eq!(h.mailer.attempts(), 1);
    assert!(h.mailer.sent().is_empty());
    h.broker.shutdown();
}

#[tokio::test]
async fn test_update_lands_after_store_outage_heals() {
    let h = harness();

    h.broker
        .publish(&h.config.topics.new_image, &upload("sunset.jpeg"))
        .unwrap();
    let records = h.records.clone();
    wait_until(|| {
        let records = records.clone();
        async move { records.get("sunset.jpeg").await.unwrap().is_some() }
    })
    .await;

    // Publish a caption into a store outage: the batch fails with a
    // transient error and is redelivered until the store recovers.
    h.records.set_failing(true);
    let mut attributes = HashMap::new();
    attributes.insert(METADATA_TYPE_ATTRIBUTE.to_string(), "Caption".to_string());
    h.broker
        .publish_with_attributes(
            &h.config.topics.new_image,
            &MetadataUpdate {
                id: "sunset.jpeg".to_string(),
                value: "golden hour".to_string(),
            },
            attributes,
        )
        .unwrap();

    // Leave the outage in place for at least one failed delivery.
    tokio::time::sleep(Duration::from_millis(200)).await;
    h.records.set_failing(false);

    let records = h.records.clone();
    assert!(
        wait_until(|| {
            let records = records.clone();
            async move {
                records
                    .get("sunset.jpeg")
                    .await
                    .unwrap()
                    .is_some_and(|r| r.caption.as_deref() == Some("golden hour"))
            }
        })
        .await
    );
    h.broker.shutdown();
}

#[tokio::test]
async fn test_encoded_object_key_is_decoded_for_the_record() {
    let h = harness();

    h.broker
        .publish(
            &h.config.topics.new_image,
            &UploadNotification {
                file_name: "my+photo%20final.png".to_string(),
                object_key: "my+photo%20final.png".to_string(),
            },
        )
        .unwrap();

    let records = h.records.clone();
    assert!(
        wait_until(|| {
            let records = records.clone();
            async move { records.get("my photo final.png").await.unwrap().is_some() }
        })
        .await
    );
    h.broker.shutdown();
}

#[tokio::test]
async fn test_metadata_for_unknown_record_creates_nothing() {
    let h = harness();

    let mut attributes = HashMap::new();
    attributes.insert(METADATA_TYPE_ATTRIBUTE.to_string(), "Caption".to_string());
    h.broker
        .publish_with_attributes(
            &h.config.topics.new_image,
            &MetadataUpdate {
                id: "ghost.png".to_string(),
                value: "nothing here".to_string(),
            },
            attributes,
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(h.records.get("ghost.png").await.unwrap().is_none());
    assert!(h.records.snapshot().is_empty());
    h.broker.shutdown();
}
