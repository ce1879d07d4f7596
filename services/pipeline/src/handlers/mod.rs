//! Queue consumers of the photoflow pipeline.
//!
//! Each consumer is an independent [`photoflow_broker::BatchHandler`] bound
//! to one queue. They share an error discipline: content that fails
//! validation (missing fields, out-of-whitelist values, a payload meant for
//! a sibling consumer on the same topic) is logged and skipped, while true
//! processing failures escape the handler so the broker can redeliver or
//! dead-letter the batch.

pub mod cleanup;
pub mod ingest;
pub mod metadata;
pub mod notify;
pub mod review;

pub use cleanup::DeadLetterRemover;
pub use ingest::IngestionValidator;
pub use metadata::MetadataUpdater;
pub use notify::Notifier;
pub use review::ModerationUpdater;
