//! Per-queue delivery configuration for the photoflow broker.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dead-letter routing for a queue.
///
/// A message that has been delivered and failed `max_receive_count` times
/// is moved to `queue` and removed from its source queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterPolicy {
    /// Name of the queue that receives exhausted messages
    pub queue: String,
    /// Delivery attempts before a message is moved
    pub max_receive_count: u32,
}

/// Delivery options for a single queue.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Maximum messages handed to the consumer per batch
    pub batch_size: usize,
    /// How long to wait for a batch to fill after the first message arrives
    pub max_batch_wait: Duration,
    /// Processing budget for one batch; exceeding it fails the whole batch
    pub handler_timeout: Duration,
    /// How long a message may live in the queue before it is dropped
    pub retention: Duration,
    /// Delay before a failed message becomes visible again
    pub redelivery_delay: Duration,
    /// Where exhausted messages go; `None` means redeliver until retention
    pub dead_letter: Option<DeadLetterPolicy>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batch_wait: Duration::from_secs(default_max_batch_wait_secs()),
            handler_timeout: Duration::from_secs(default_handler_timeout_secs()),
            retention: Duration::from_secs(default_retention_secs()),
            redelivery_delay: Duration::from_millis(default_redelivery_delay_ms()),
            dead_letter: None,
        }
    }
}

impl QueueOptions {
    /// Set the dead-letter policy.
    pub fn with_dead_letter(mut self, policy: DeadLetterPolicy) -> Self {
        self.dead_letter = Some(policy);
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the batching window.
    pub fn with_max_batch_wait(mut self, wait: Duration) -> Self {
        self.max_batch_wait = wait;
        self
    }

    /// Set the per-batch processing budget.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Set the retention period.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the redelivery delay.
    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }
}

fn default_batch_size() -> usize {
    5
}

fn default_max_batch_wait_secs() -> u64 {
    5
}

fn default_handler_timeout_secs() -> u64 {
    10
}

fn default_retention_secs() -> u64 {
    300
}

fn default_redelivery_delay_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = QueueOptions::default();
        assert_eq!(options.batch_size, 5);
        assert_eq!(options.max_batch_wait, Duration::from_secs(5));
        assert_eq!(options.handler_timeout, Duration::from_secs(10));
        assert!(options.dead_letter.is_none());
    }

    #[test]
    fn test_builder_setters() {
        let options = QueueOptions::default()
            .with_batch_size(0)
            .with_dead_letter(DeadLetterPolicy {
                queue: "bad-images".to_string(),
                max_receive_count: 1,
            });

        // Batch size is clamped to at least one message.
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.dead_letter.unwrap().max_receive_count, 1);
    }
}
