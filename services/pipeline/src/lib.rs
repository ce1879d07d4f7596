//! Photoflow Pipeline - event-driven image upload and moderation pipeline
//!
//! This library wires the photoflow broker into a fan-out pipeline for
//! uploaded images:
//!
//! - Upload notifications are validated and logged as image records
//! - Rejected uploads are dead-lettered and removed from object storage
//! - Front-end metadata and moderation decisions patch the records
//! - Applied moderation decisions trigger a confirmation mail
//!
//! # Example
//!
//! ```rust,no_run
//! use photoflow_pipeline::config::Config;
//! use photoflow_pipeline::mailer::MemoryMailer;
//! use photoflow_pipeline::object_store::MemoryObjectStore;
//! use photoflow_pipeline::record_store::MemoryRecordStore;
//! use photoflow_pipeline::topology;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let broker = topology::build(
//!         &config,
//!         Arc::new(MemoryRecordStore::new(&config.store.table)),
//!         Arc::new(MemoryObjectStore::new(&config.storage.bucket)),
//!         Arc::new(MemoryMailer::new()),
//!     )?;
//!
//!     broker.publish(
//!         &config.topics.new_image,
//!         &serde_json::json!({"fileName": "sunset.png", "objectKey": "sunset.png"}),
//!     )?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod events;
pub mod handlers;
pub mod mailer;
pub mod object_store;
pub mod record_store;
pub mod topology;

// Re-export main types
pub use config::Config;
pub use events::{
    MetadataKind, MetadataUpdate, ReviewCompleted, ReviewOutcome, ReviewStatus, ReviewUpdate,
    UploadNotification, METADATA_TYPE_ATTRIBUTE,
};
pub use handlers::{
    DeadLetterRemover, IngestionValidator, MetadataUpdater, ModerationUpdater, Notifier,
};
pub use mailer::{MailError, MailTransport, MemoryMailer, SmtpMailer};
pub use object_store::{MemoryObjectStore, ObjectStore};
pub use record_store::{ImageRecord, MemoryRecordStore, RecordPatch, RecordStore, StoreError};
