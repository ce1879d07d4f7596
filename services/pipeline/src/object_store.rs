//! Object store interface and in-memory implementation.
//!
//! The pipeline only ever deletes objects (the dead-letter cleanup path);
//! `put` exists so the demo driver and tests can seed a bucket.

use crate::record_store::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Raw object storage keyed by object key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store raw bytes under a key.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Delete the object at `key`. Deleting an absent object is not an
    /// error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Whether an object exists at `key`.
    async fn contains(&self, key: &str) -> Result<bool, StoreError>;
}

/// In-memory object store.
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(HashMap::new()),
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
                store: self.bucket.clone(),
                message: "simulated outage".to_string(),
            });
        }
        Ok(())
    }

    /// Bucket name this store was configured with.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        match self.objects.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        if self.lock().remove(key).is_none() {
            debug!(bucket = %self.bucket, key = %key, "delete of absent object ignored");
        }
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.lock().contains_key(key))
    }
}
