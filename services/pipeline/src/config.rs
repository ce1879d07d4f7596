//! Configuration for the photoflow pipeline service.
//!
//! Values without a default (table name, bucket name, mail sender and
//! recipient) must be present at load time; a missing value aborts startup
//! rather than surfacing at the first message.

use photoflow_broker::QueueOptions;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the pipeline service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Broker delivery tuning
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Record store configuration
    pub store: StoreConfig,
    /// Object store configuration
    pub storage: StorageConfig,
    /// Outbound mail configuration
    pub mail: MailConfig,
    /// Topic names
    #[serde(default)]
    pub topics: TopicConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Delivery tuning applied to every queue
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Messages per consumer batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Batching window in milliseconds
    #[serde(default = "default_max_batch_wait_ms")]
    pub max_batch_wait_ms: u64,
    /// Per-batch processing budget in seconds
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
    /// Queue retention in seconds
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Delay before a failed message is visible again, in milliseconds
    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,
    /// Delivery attempts before an upload notification is dead-lettered
    #[serde(default = "default_image_process_max_receive_count")]
    pub image_process_max_receive_count: u32,
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Table holding image records
    pub table: String,
}

/// Object store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket holding uploaded images
    pub bucket: String,
}

/// Outbound mail configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Sender address
    pub from: String,
    /// Recipient address for review confirmations
    pub to: String,
    /// SMTP relay host; unset means mail is kept in memory
    pub smtp_host: Option<String>,
    /// SMTP relay port
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username
    pub smtp_user: Option<String>,
    /// SMTP password
    pub smtp_password: Option<String>,
    /// Use STARTTLS when talking to the relay
    #[serde(default = "default_true")]
    pub smtp_tls: bool,
}

/// Topic names for the pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct TopicConfig {
    /// Topic fed by upload notifications and front-end updates
    #[serde(default = "default_new_image_topic")]
    pub new_image: String,
    /// Topic fed by applied moderation decisions
    #[serde(default = "default_review_completed_topic")]
    pub review_completed: String,
}

// Default value functions
fn default_service_name() -> String {
    "photoflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_batch_size() -> usize {
    5
}

fn default_max_batch_wait_ms() -> u64 {
    5000
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

fn default_image_process_max_receive_count() -> u32 {
    1
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_new_image_topic() -> String {
    "new-image".to_string()
}

fn default_review_completed_topic() -> String {
    "review-completed".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batch_wait_ms: default_max_batch_wait_ms(),
            handler_timeout_secs: default_handler_timeout_secs(),
            retention_secs: default_retention_secs(),
            redelivery_delay_ms: default_redelivery_delay_ms(),
            image_process_max_receive_count: default_image_process_max_receive_count(),
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            new_image: default_new_image_topic(),
            review_completed: default_review_completed_topic(),
        }
    }
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/photoflow").required(false))
            .add_source(config::File::with_name("/etc/photoflow/photoflow").required(false))
            // Override with environment variables
            // PHOTOFLOW__STORE__TABLE -> store.table
            .add_source(
                config::Environment::with_prefix("PHOTOFLOW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that deserialize but cannot run.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.table.is_empty() {
            anyhow::bail!("store.table must not be empty");
        }
        if self.storage.bucket.is_empty() {
            anyhow::bail!("storage.bucket must not be empty");
        }
        if self.mail.from.is_empty() || self.mail.to.is_empty() {
            anyhow::bail!("mail.from and mail.to must not be empty");
        }
        Ok(())
    }

    /// Base queue options shared by every queue in the topology.
    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions::default()
            .with_batch_size(self.broker.batch_size)
            .with_max_batch_wait(Duration::from_millis(self.broker.max_batch_wait_ms))
            .with_handler_timeout(Duration::from_secs(self.broker.handler_timeout_secs))
            .with_retention(Duration::from_secs(self.broker.retention_secs))
            .with_redelivery_delay(Duration::from_millis(self.broker.redelivery_delay_ms))
    }
}
