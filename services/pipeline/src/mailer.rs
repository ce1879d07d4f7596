//! Outbound mail transport for review confirmations.
//!
//! The SMTP implementation sends to a single statically configured
//! recipient. The in-memory implementation records sent mail and can be
//! armed to fail, which the notifier tests use to verify that a transport
//! outage never causes redelivery.

use crate::config::MailConfig;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

/// Errors from building or sending mail.
#[derive(Error, Debug)]
pub enum MailError {
    #[error("invalid mail address {address}: {message}")]
    Address { address: String, message: String },

    #[error("failed to build mail message: {0}")]
    Message(String),

    #[error("mail transport failure: {0}")]
    Transport(String),
}

/// Transport for HTML notification mail.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send one HTML mail to the configured recipient.
    async fn send(&self, subject: &str, html_body: &str) -> Result<(), MailError>;
}

/// SMTP-backed mail transport.
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    /// Build the transport from config. Returns `None` when no SMTP host
    /// is configured, so callers can fall back to a local transport.
    pub fn from_config(config: &MailConfig) -> Result<Option<Self>, MailError> {
        let Some(ref host) = config.smtp_host else {
            return Ok(None);
        };

        let from = parse_mailbox(&config.from)?;
        let to = parse_mailbox(&config.to)?;

        let builder = if config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| MailError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        let builder = builder.port(config.smtp_port);
        let builder = match (&config.smtp_user, &config.smtp_password) {
            (Some(user), Some(password)) => {
                builder.credentials(Credentials::new(user.clone(), password.clone()))
            }
            _ => builder,
        };

        info!(host = %host, port = config.smtp_port, "mail transport initialized (SMTP)");

        Ok(Some(Self {
            mailer: builder.build(),
            from,
            to,
        }))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| {
        MailError::Address {
            address: address.to_string(),
            message: e.to_string(),
        }
    })
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, subject: &str, html_body: &str) -> Result<(), MailError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| MailError::Message(e.to_string()))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        info!(to = %self.to, subject = %subject, "sent notification mail");
        Ok(())
    }
}

/// One mail captured by [`MemoryMailer`].
#[derive(Debug, Clone)]
pub struct SentMail {
    pub subject: String,
    pub html_body: String,
}

/// In-memory mail transport for tests and SMTP-less runs.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<SentMail>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All mail sent so far.
    pub fn sent(&self) -> Vec<SentMail> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Total send attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Make every subsequent send fail (simulated transport outage).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MailTransport for MemoryMailer {
    async fn send(&self, subject: &str, html_body: &str) -> Result<(), MailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Transport("simulated outage".to_string()));
        }
        match self.sent.lock() {
            Ok(mut guard) => guard.push(SentMail {
                subject: subject.to_string(),
                html_body: html_body.to_string(),
            }),
            Err(poisoned) => poisoned.into_inner().push(SentMail {
                subject: subject.to_string(),
                html_body: html_body.to_string(),
            }),
        }
        info!(subject = %subject, "recorded mail (in-memory transport)");
        Ok(())
    }
}
