//! Photoflow broker - in-process event routing for the image pipeline
//!
//! This library provides the fan-out core of the photoflow platform:
//!
//! - Topics broadcast each published message to every subscribed queue
//! - Queues deliver messages to their bound consumer in batches, at least
//!   once, with all-or-nothing batch acknowledgment
//! - A per-queue dead-letter policy moves a message that has exhausted its
//!   delivery attempts to a designated queue; without one, failed messages
//!   are redelivered until the queue's retention period expires
//!
//! # Example
//!
//! ```rust,no_run
//! use photoflow_broker::prelude::*;
//! use std::sync::Arc;
//!
//! struct LogHandler;
//!
//! #[async_trait]
//! impl BatchHandler for LogHandler {
//!     async fn handle(&self, batch: &[Envelope]) -> Result<(), HandlerError> {
//!         println!("got {} messages", batch.len());
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let broker = Broker::new();
//! broker.add_queue("image-process", QueueOptions::default(), Arc::new(LogHandler))?;
//! broker.subscribe("new-image", "image-process")?;
//! broker.publish("new-image", &serde_json::json!({ "objectKey": "sunset.jpeg" }))?;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod envelope;
pub mod queue;

// Re-export main types
pub use broker::{Broker, BrokerError, Publisher};
pub use config::{DeadLetterPolicy, QueueOptions};
pub use envelope::Envelope;
pub use queue::{BatchHandler, HandlerError};

/// Async trait attribute for implementing [`BatchHandler`] (re-export for
/// convenience).
pub use async_trait::async_trait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::broker::{Broker, BrokerError, Publisher};
    pub use crate::config::{DeadLetterPolicy, QueueOptions};
    pub use crate::envelope::Envelope;
    pub use crate::queue::{BatchHandler, HandlerError};
    pub use async_trait::async_trait;
}
