//! Queue workers for the photoflow broker.
//!
//! Each queue owns one worker task that collects envelopes into batches and
//! hands them to its bound consumer. A batch is acknowledged as a whole or
//! fails as a whole: on failure every envelope is considered for redelivery,
//! dead-lettering, or retention-based drop, individually.

use crate::config::QueueOptions;
use crate::envelope::Envelope;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Errors a batch consumer can return.
///
/// The two variants that consumers produce are deliberately distinct:
/// `Unsupported` marks input the pipeline refuses to process and is the
/// trigger for dead-lettering on queues configured with a single delivery
/// attempt, while `Other` wraps transient infrastructure failures that are
/// expected to heal on redelivery. `Timeout` is produced by the queue
/// worker itself when a batch exceeds its processing budget.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("unsupported input: {0}")]
    Unsupported(String),

    #[error("batch processing timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Handler trait for processing message batches.
///
/// Handlers must be re-entrant: batches for the same key may be in flight
/// on different queues concurrently, and no ordering is guaranteed.
#[async_trait::async_trait]
pub trait BatchHandler: Send + Sync {
    /// Process one batch. `Ok` acknowledges every envelope in the batch;
    /// any error acknowledges none of them.
    async fn handle(&self, batch: &[Envelope]) -> Result<(), HandlerError>;
}

/// Sending side of a registered queue.
#[derive(Clone)]
pub(crate) struct QueueHandle {
    pub(crate) name: String,
    pub(crate) tx: mpsc::UnboundedSender<Envelope>,
}

/// Resolved dead-letter target for a queue worker.
pub(crate) struct DeadLetterTarget {
    pub(crate) max_receive_count: u32,
    pub(crate) queue: QueueHandle,
}

/// Worker task state for a single queue.
pub(crate) struct QueueWorker {
    pub(crate) name: String,
    pub(crate) options: QueueOptions,
    pub(crate) handler: Arc<dyn BatchHandler>,
    pub(crate) rx: mpsc::UnboundedReceiver<Envelope>,
    /// Sender back into this queue, used for redelivery
    pub(crate) redeliver_tx: mpsc::UnboundedSender<Envelope>,
    pub(crate) dead_letter: Option<DeadLetterTarget>,
    pub(crate) shutdown: broadcast::Receiver<()>,
}

impl QueueWorker {
    /// Consume batches until shutdown is signalled or the queue is dropped.
    pub(crate) async fn run(mut self) {
        info!(queue = %self.name, "starting queue worker");

        loop {
            let batch = match self.collect_batch().await {
                Some(batch) => batch,
                None => break,
            };
            self.deliver(batch).await;
        }

        info!(queue = %self.name, "queue worker stopped");
    }

    /// Wait for the first envelope, then fill the batch until it is full or
    /// the batching window closes.
    async fn collect_batch(&mut self) -> Option<Vec<Envelope>> {
        let first = tokio::select! {
            _ = self.shutdown.recv() => return None,
            message = self.rx.recv() => message?,
        };

        let mut batch = vec![first];
        let deadline = tokio::time::Instant::now() + self.options.max_batch_wait;

        while batch.len() < self.options.batch_size {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(envelope)) => batch.push(envelope),
                Ok(None) | Err(_) => break,
            }
        }

        Some(batch)
    }

    /// Deliver one batch to the handler, then acknowledge or fail it as a
    /// whole.
    async fn deliver(&mut self, mut batch: Vec<Envelope>) {
        for envelope in &mut batch {
            envelope.receive_count += 1;
        }

        debug!(
            queue = %self.name,
            size = batch.len(),
            "delivering batch"
        );

        let result = match tokio::time::timeout(
            self.options.handler_timeout,
            self.handler.handle(&batch),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(HandlerError::Timeout(self.options.handler_timeout)),
        };

        match result {
            Ok(()) => {
                metrics::counter!("broker.messages.delivered", "queue" => self.name.clone())
                    .increment(batch.len() as u64);
                debug!(queue = %self.name, size = batch.len(), "batch acknowledged");
            }
            Err(e) => {
                metrics::counter!("broker.batches.failed", "queue" => self.name.clone())
                    .increment(1);
                warn!(
                    queue = %self.name,
                    size = batch.len(),
                    error = %e,
                    "batch failed, nothing acknowledged"
                );
                for envelope in batch {
                    self.dispose(envelope);
                }
            }
        }
    }

    /// Route one envelope of a failed batch: dead-letter, drop on retention
    /// expiry, or schedule redelivery.
    fn dispose(&self, envelope: Envelope) {
        if let Some(ref target) = self.dead_letter {
            if envelope.receive_count >= target.max_receive_count {
                metrics::counter!("broker.messages.dead_lettered", "queue" => self.name.clone())
                    .increment(1);
                warn!(
                    queue = %self.name,
                    dead_letter_queue = %target.queue.name,
                    message_id = %envelope.message_id,
                    receive_count = envelope.receive_count,
                    "moving message to dead-letter queue"
                );
                if target.queue.tx.send(envelope.for_redrive()).is_err() {
                    warn!(
                        queue = %self.name,
                        dead_letter_queue = %target.queue.name,
                        "dead-letter queue is closed, message lost"
                    );
                }
                return;
            }
        }

        if envelope.age() >= self.options.retention {
            metrics::counter!("broker.messages.dropped", "queue" => self.name.clone())
                .increment(1);
            warn!(
                queue = %self.name,
                message_id = %envelope.message_id,
                receive_count = envelope.receive_count,
                "retention expired, dropping message"
            );
            return;
        }

        metrics::counter!("broker.messages.redelivered", "queue" => self.name.clone())
            .increment(1);
        let tx = self.redeliver_tx.clone();
        let delay = self.options.redelivery_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The worker may have shut down in the meantime.
            let _ = tx.send(envelope);
        });
    }
}
