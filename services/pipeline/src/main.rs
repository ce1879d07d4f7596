//! Photoflow pipeline service binary.
//!
//! Builds the broker topology against in-memory stores, drives a short
//! demonstration through it (an accepted upload, a rejected upload, a
//! metadata update, and a moderation decision), then stays up serving the
//! pipeline until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use photoflow_pipeline::config::Config;
use photoflow_pipeline::events::{
    MetadataUpdate, ReviewOutcome, ReviewStatus, ReviewUpdate, UploadNotification,
    METADATA_TYPE_ATTRIBUTE,
};
use photoflow_pipeline::mailer::{MailTransport, MemoryMailer, SmtpMailer};
use photoflow_pipeline::object_store::{MemoryObjectStore, ObjectStore};
use photoflow_pipeline::record_store::MemoryRecordStore;
use photoflow_pipeline::topology;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Photoflow Pipeline Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    let records = Arc::new(MemoryRecordStore::new(&config.store.table));
    let objects = Arc::new(MemoryObjectStore::new(&config.storage.bucket));

    let mailer: Arc<dyn MailTransport> = match SmtpMailer::from_config(&config.mail)
        .context("Failed to initialize SMTP mailer")?
    {
        Some(smtp) => Arc::new(smtp),
        None => {
            warn!("mail.smtp_host not set, keeping outbound mail in memory");
            Arc::new(MemoryMailer::new())
        }
    };

    let broker = topology::build(&config, records.clone(), objects.clone(), mailer)
        .context("Failed to build pipeline topology")?;

    info!("Pipeline service started successfully");

    run_demo(&config, broker.as_ref(), objects.as_ref()).await?;

    // Leave time for the batching windows and the dead-letter redrive to
    // run before reporting, then keep serving until a signal arrives.
    let settle = Duration::from_millis(config.broker.max_batch_wait_ms * 3);
    tokio::time::sleep(settle).await;

    for record in records.snapshot() {
        info!(?record, "image record");
    }

    shutdown_signal().await;

    info!("Shutting down pipeline service");
    broker.shutdown();
    info!("Pipeline service stopped");

    Ok(())
}

/// Publish one example event of each kind the pipeline consumes.
async fn run_demo(config: &Config, broker: &photoflow_broker::Broker, objects: &MemoryObjectStore) -> Result<()> {
    // A valid upload: logged as a record by the ingestion validator.
    objects.put("sunset.jpeg", vec![0u8; 16]).await?;
    broker.publish(
        &config.topics.new_image,
        &UploadNotification {
            file_name: "sunset.jpeg".to_string(),
            object_key: "sunset.jpeg".to_string(),
        },
    )?;

    // An invalid upload: dead-lettered, then removed from object storage.
    objects.put("report.pdf", vec![0u8; 16]).await?;
    broker.publish(
        &config.topics.new_image,
        &UploadNotification {
            file_name: "report.pdf".to_string(),
            object_key: "report.pdf".to_string(),
        },
    )?;

    // A caption for the valid upload.
    let mut attributes = HashMap::new();
    attributes.insert(METADATA_TYPE_ATTRIBUTE.to_string(), "Caption".to_string());
    broker.publish_with_attributes(
        &config.topics.new_image,
        &MetadataUpdate {
            id: "sunset.jpeg".to_string(),
            value: "Sunset over the bay".to_string(),
        },
        attributes,
    )?;

    // A moderation decision: patches the record and mails the uploader.
    broker.publish(
        &config.topics.new_image,
        &ReviewUpdate {
            id: "sunset.jpeg".to_string(),
            date: chrono::Utc::now().to_rfc3339(),
            update: ReviewOutcome {
                status: ReviewStatus::Pass,
                reason: "meets content guidelines".to_string(),
            },
        },
    )?;

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
