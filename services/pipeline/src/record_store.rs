//! Record store interface and in-memory implementation.
//!
//! Records are keyed by file name. The store exposes two write primitives:
//! an idempotent insert used by the ingestion path, and an atomic partial
//! update used by the metadata and moderation paths. Updates against an
//! absent record are silently ignored rather than auto-creating one: a
//! record exists only once the ingestion validator has accepted the upload.

use crate::events::{MetadataKind, ReviewStatus};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Errors from the record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store {store} is unavailable: {message}")]
    Unavailable { store: String, message: String },
}

/// Per-image attribute set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub file_name: String,
    pub caption: Option<String>,
    pub date: Option<String>,
    pub name: Option<String>,
    pub status: Option<ReviewStatus>,
    pub reason: Option<String>,
    pub review_date: Option<String>,
}

impl ImageRecord {
    fn new(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            ..Default::default()
        }
    }
}

/// A partial update applied atomically to one record.
#[derive(Debug, Clone)]
pub enum RecordPatch {
    /// Set exactly one whitelisted metadata attribute
    Metadata { kind: MetadataKind, value: String },
    /// Set the three moderation attributes together
    Review {
        status: ReviewStatus,
        reason: String,
        review_date: String,
    },
}

impl RecordPatch {
    pub fn metadata(kind: MetadataKind, value: impl Into<String>) -> Self {
        RecordPatch::Metadata {
            kind,
            value: value.into(),
        }
    }

    pub fn review(
        status: ReviewStatus,
        reason: impl Into<String>,
        review_date: impl Into<String>,
    ) -> Self {
        RecordPatch::Review {
            status,
            reason: reason.into(),
            review_date: review_date.into(),
        }
    }
}

/// Key-value persistence for image records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a blank record if none exists for `file_name`. A duplicate
    /// insert is accepted and leaves existing attributes untouched.
    async fn put(&self, file_name: &str) -> Result<(), StoreError>;

    /// Apply a partial update atomically. Updating an absent record is a
    /// no-op, never a creation.
    async fn update(&self, file_name: &str, patch: RecordPatch) -> Result<(), StoreError>;

    /// Fetch a record by file name.
    async fn get(&self, file_name: &str) -> Result<Option<ImageRecord>, StoreError>;
}

/// In-memory record store. The whole patch is applied under one lock, so
/// concurrent writers to disjoint attributes never clobber each other.
pub struct MemoryRecordStore {
    table: String,
    records: Mutex<HashMap<String, ImageRecord>>,
    failing: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            records: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent operation fail (simulated store outage).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                store: self.table.clone(),
                message: "simulated outage".to_string(),
            });
        }
        Ok(())
    }

    /// Table name this store was configured with.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Snapshot of all records, for the demo driver and tests.
    pub fn snapshot(&self) -> Vec<ImageRecord> {
        let mut records: Vec<ImageRecord> =
            self.lock().values().cloned().collect();
        records.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        records
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ImageRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn put(&self, file_name: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut records = self.lock();
        records
            .entry(file_name.to_string())
            .or_insert_with(|| ImageRecord::new(file_name));
        Ok(())
    }

    async fn update(&self, file_name: &str, patch: RecordPatch) -> Result<(), StoreError> {
        self.check_available()?;
        let mut records = self.lock();
        let Some(record) = records.get_mut(file_name) else {
            debug!(
                table = %self.table,
                file_name = %file_name,
                "update of absent record ignored"
            );
            return Ok(());
        };

        match patch {
            RecordPatch::Metadata { kind, value } => match kind {
                MetadataKind::Caption => record.caption = Some(value),
                MetadataKind::Date => record.date = Some(value),
                MetadataKind::Name => record.name = Some(value),
            },
            RecordPatch::Review {
                status,
                reason,
                review_date,
            } => {
                record.status = Some(status);
                record.reason = Some(reason);
                record.review_date = Some(review_date);
            }
        }
        Ok(())
    }

    async fn get(&self, file_name: &str) -> Result<Option<ImageRecord>, StoreError> {
        self.check_available()?;
        Ok(self.lock().get(file_name).cloned())
    }
}
