//! Topic registry and publish path for the photoflow broker.
//!
//! Topics broadcast each published message to every subscribed queue as an
//! independent envelope copy: each queue tracks its own receive count and
//! enqueue time, so delivery, retry, and dead-lettering never couple queues
//! to each other.

use crate::config::QueueOptions;
use crate::envelope::Envelope;
use crate::queue::{BatchHandler, DeadLetterTarget, QueueHandle, QueueWorker};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Errors from registering queues or publishing messages.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("queue {0} is already registered")]
    QueueExists(String),

    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

struct Registry {
    /// topic name -> subscribed queue names
    topics: HashMap<String, Vec<String>>,
    /// queue name -> sending side
    queues: HashMap<String, QueueHandle>,
}

/// In-process fan-out broker: named topics feeding competing-consumer
/// queues with at-least-once, batched delivery.
pub struct Broker {
    registry: Mutex<Registry>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    /// Create an empty broker.
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            registry: Mutex::new(Registry {
                topics: HashMap::new(),
                queues: HashMap::new(),
            }),
            shutdown_tx,
        }
    }

    /// Register a queue and spawn its worker task.
    ///
    /// If `options` carries a dead-letter policy, the target queue must
    /// already be registered.
    pub fn add_queue(
        &self,
        name: &str,
        options: QueueOptions,
        handler: Arc<dyn BatchHandler>,
    ) -> Result<(), BrokerError> {
        let mut registry = self.lock_registry();

        if registry.queues.contains_key(name) {
            return Err(BrokerError::QueueExists(name.to_string()));
        }

        let dead_letter = match options.dead_letter {
            Some(ref policy) => {
                let target = registry
                    .queues
                    .get(&policy.queue)
                    .ok_or_else(|| BrokerError::UnknownQueue(policy.queue.clone()))?;
                Some(DeadLetterTarget {
                    max_receive_count: policy.max_receive_count,
                    queue: target.clone(),
                })
            }
            None => None,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = QueueHandle {
            name: name.to_string(),
            tx: tx.clone(),
        };
        registry.queues.insert(name.to_string(), handle);

        let worker = QueueWorker {
            name: name.to_string(),
            options,
            handler,
            rx,
            redeliver_tx: tx,
            dead_letter,
            shutdown: self.shutdown_tx.subscribe(),
        };
        tokio::spawn(worker.run());

        info!(queue = %name, "registered queue");
        Ok(())
    }

    /// Bind a registered queue to a topic. The topic is created on first
    /// reference; binding the same pair twice is a no-op.
    pub fn subscribe(&self, topic: &str, queue: &str) -> Result<(), BrokerError> {
        let mut registry = self.lock_registry();

        if !registry.queues.contains_key(queue) {
            return Err(BrokerError::UnknownQueue(queue.to_string()));
        }

        let subscribers = registry.topics.entry(topic.to_string()).or_default();
        if !subscribers.iter().any(|name| name == queue) {
            subscribers.push(queue.to_string());
        }

        info!(topic = %topic, queue = %queue, "bound queue to topic");
        Ok(())
    }

    /// Publish a message to a topic without attributes.
    pub fn publish<T: serde::Serialize>(&self, topic: &str, message: &T) -> Result<usize, BrokerError> {
        self.publish_with_attributes(topic, message, HashMap::new())
    }

    /// Publish a message to a topic, fanning an independent envelope copy
    /// out to every subscribed queue. Returns the fan-out count.
    pub fn publish_with_attributes<T: serde::Serialize>(
        &self,
        topic: &str,
        message: &T,
        attributes: HashMap<String, String>,
    ) -> Result<usize, BrokerError> {
        let payload = serde_json::to_vec(message)?;
        let targets = self.topic_targets(topic)?;
        Ok(fan_out(topic, &payload, &attributes, &targets))
    }

    /// Snapshot a publish handle for one topic, for consumers that
    /// republish downstream events. Subscriptions added after the snapshot
    /// are not seen by the handle.
    pub fn publisher(&self, topic: &str) -> Result<Publisher, BrokerError> {
        let targets = self.topic_targets(topic)?;
        Ok(Publisher {
            topic: topic.to_string(),
            targets,
        })
    }

    /// Signal every queue worker to stop after its current batch.
    pub fn shutdown(&self) {
        info!("signalling broker shutdown");
        let _ = self.shutdown_tx.send(());
    }

    fn topic_targets(&self, topic: &str) -> Result<Vec<QueueHandle>, BrokerError> {
        let registry = self.lock_registry();
        let subscribers = registry
            .topics
            .get(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
        Ok(subscribers
            .iter()
            .filter_map(|name| registry.queues.get(name).cloned())
            .collect())
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        // Registry mutations never panic while the lock is held.
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Publish handle bound to a single topic.
#[derive(Clone)]
pub struct Publisher {
    topic: String,
    targets: Vec<QueueHandle>,
}

impl Publisher {
    /// The topic this handle publishes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a message to the topic's subscribers at snapshot time.
    pub fn publish<T: serde::Serialize>(&self, message: &T) -> Result<usize, BrokerError> {
        let payload = serde_json::to_vec(message)?;
        Ok(fan_out(&self.topic, &payload, &HashMap::new(), &self.targets))
    }
}

/// Send one envelope copy per target queue. Fan-out is independent: a
/// closed queue is logged and skipped, the rest still receive the message.
fn fan_out(
    topic: &str,
    payload: &[u8],
    attributes: &HashMap<String, String>,
    targets: &[QueueHandle],
) -> usize {
    let mut sent = 0;
    for target in targets {
        let envelope = Envelope::new(payload.to_vec(), attributes.clone());
        let message_id = envelope.message_id;
        if target.tx.send(envelope).is_ok() {
            debug!(
                topic = %topic,
                queue = %target.name,
                message_id = %message_id,
                "published message"
            );
            sent += 1;
        } else {
            warn!(
                topic = %topic,
                queue = %target.name,
                "queue is closed, skipping fan-out"
            );
        }
    }
    metrics::counter!("broker.messages.published", "topic" => topic.to_string())
        .increment(sent as u64);
    sent
}
