//! Notifier: mails the uploader the outcome of a review.
//!
//! Bound to the `mailer` queue. Unlike every other consumer, a transport
//! failure here is swallowed: redelivering the message could duplicate a
//! mail that already left the relay, so the send is attempted exactly once
//! per delivery.

use crate::events::ReviewCompleted;
use crate::mailer::MailTransport;
use photoflow_broker::{BatchHandler, Envelope, HandlerError};
use std::sync::Arc;
use tracing::{error, info};

pub struct Notifier {
    mailer: Arc<dyn MailTransport>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn MailTransport>) -> Self {
        Self { mailer }
    }

    fn subject(completed: &ReviewCompleted) -> String {
        format!("Your image {} review status", completed.id)
    }

    fn html_body(completed: &ReviewCompleted) -> String {
        let subject = Self::subject(completed);
        let message = format!(
            r#"Your image "{}" has been reviewed.<br/><b>Status:</b> {}<br/><b>Reason:</b> {}"#,
            completed.id, completed.update.status, completed.update.reason
        );
        format!(
            r#"<html>
  <body>
    <h2>{subject}</h2>
    <p style="font-size:16px; line-height:1.5;">{message}</p>
  </body>
</html>"#
        )
    }
}

#[async_trait::async_trait]
impl BatchHandler for Notifier {
    async fn handle(&self, batch: &[Envelope]) -> Result<(), HandlerError> {
        for envelope in batch {
            let completed: ReviewCompleted = match envelope.decode_json() {
                Ok(completed) => completed,
                Err(_) => {
                    info!(
                        message_id = %envelope.message_id,
                        "skipping mail send due to missing fields"
                    );
                    continue;
                }
            };

            if completed.id.is_empty() || completed.update.reason.is_empty() {
                info!(
                    message_id = %envelope.message_id,
                    "skipping mail send due to empty fields"
                );
                continue;
            }

            let subject = Self::subject(&completed);
            let body = Self::html_body(&completed);

            match self.mailer.send(&subject, &body).await {
                Ok(()) => {
                    metrics::counter!("pipeline.mails.sent").increment(1);
                    info!(id = %completed.id, "sent review mail");
                }
                Err(e) => {
                    // Swallowed on purpose: a redelivered mail may already
                    // have reached the recipient once.
                    metrics::counter!("pipeline.mails.failed").increment(1);
                    error!(id = %completed.id, error = %e, "failed to send review mail");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ReviewOutcome, ReviewStatus};
    use crate::mailer::MemoryMailer;
    use std::collections::HashMap;

    fn completed_envelope(id: &str, status: ReviewStatus, reason: &str) -> Envelope {
        let payload = serde_json::to_vec(&ReviewCompleted {
            id: id.to_string(),
            date: "2024-01-01".to_string(),
            update: ReviewOutcome {
                status,
                reason: reason.to_string(),
            },
        })
        .unwrap();
        Envelope::new(payload, HashMap::new())
    }

    #[tokio::test]
    async fn test_mail_reflects_review_outcome() {
        let mailer = Arc::new(MemoryMailer::new());
        let handler = Notifier::new(mailer.clone());

        handler
            .handle(&[completed_envelope("a.png", ReviewStatus::Reject, "blurry")])
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Your image a.png review status");
        assert!(sent[0].html_body.contains("<b>Status:</b> Reject"));
        assert!(sent[0].html_body.contains("<b>Reason:</b> blurry"));
    }

    #[tokio::test]
    async fn test_transport_outage_is_swallowed() {
        let mailer = Arc::new(MemoryMailer::new());
        mailer.set_failing(true);
        let handler = Notifier::new(mailer.clone());

        // The batch must still succeed so the broker never redelivers it.
        handler
            .handle(&[completed_envelope("a.png", ReviewStatus::Pass, "ok")])
            .await
            .unwrap();

        assert_eq!(mailer.attempts(), 1);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let mailer = Arc::new(MemoryMailer::new());
        let handler = Notifier::new(mailer.clone());

        let envelope = Envelope::new(br#"{"id":"a.png"}"#.to_vec(), HashMap::new());
        handler.handle(&[envelope]).await.unwrap();

        assert_eq!(mailer.attempts(), 0);
    }
}
