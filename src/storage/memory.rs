//! In-process object storage. Holds objects in a map and can be told to fail
//! deletes, which is how tests drive the `pending_delete` path.

use super::{ObjectStorage, PresignedPut, StorageBackendError, StorageBackendResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
    delete_calls: Arc<AtomicUsize>,
    fail_deletes: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes under `key`, standing in for the client's presigned PUT.
    pub fn put_object(&self, key: &str, body: impl Into<Bytes>) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(key.to_string(), body.into());
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .map(|objects| objects.contains_key(key))
            .unwrap_or(false)
    }

    /// Number of delete calls that reached the backend, failed ones included.
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageBackendResult<PresignedPut> {
        if key.is_empty() {
            return Err(StorageBackendError::Invalid("object key is required".into()));
        }
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        Ok(PresignedPut {
            url: format!("memory://{}?expires={}", key, expires_in.as_secs()),
            headers,
        })
    }

    async fn delete_object(&self, key: &str) -> StorageBackendResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageBackendError::Backend(format!(
                "simulated delete failure for `{}`",
                key
            )));
        }
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| StorageBackendError::Backend("memory storage poisoned".into()))?;
        objects.remove(key);
        Ok(())
    }
}
