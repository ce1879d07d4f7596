//! Message envelopes carried by the photoflow broker.
//!
//! An envelope wraps a JSON-serialized payload together with delivery
//! metadata. Queues clone envelopes on fan-out, so receive counts and
//! enqueue times are tracked independently per queue.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A message as delivered to a queue consumer.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Unique message ID, shared across fan-out copies of one publish
    pub message_id: Uuid,
    /// Message attributes (e.g. `metadata_type` for metadata updates)
    pub attributes: HashMap<String, String>,
    /// JSON-serialized message payload
    pub payload: Vec<u8>,
    /// Number of times this envelope has been delivered to a consumer
    pub receive_count: u32,
    /// When the envelope entered its current queue
    pub(crate) enqueued_at: Instant,
}

impl Envelope {
    /// Create a fresh envelope ready for its first delivery.
    pub fn new(payload: Vec<u8>, attributes: HashMap<String, String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            attributes,
            payload,
            receive_count: 0,
            enqueued_at: Instant::now(),
        }
    }

    /// Deserialize the payload as JSON.
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Get an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    /// How long the envelope has been sitting in its current queue.
    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Reset delivery bookkeeping when the envelope moves to another queue.
    pub(crate) fn for_redrive(mut self) -> Self {
        self.receive_count = 0;
        self.enqueued_at = Instant::now();
        self
    }
}
