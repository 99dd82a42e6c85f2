//! Object storage backends and the public URL scheme.
//!
//! The service never streams object bytes itself: clients PUT straight to a
//! presigned URL, and the service only needs to presign writes and delete
//! keys. Both are behind [`ObjectStorage`] so the lifecycle code can run
//! against S3/R2 in production and [`memory::MemoryStorage`] in tests.

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use std::{collections::BTreeMap, time::Duration};
use thiserror::Error;

pub use memory::MemoryStorage;
pub use s3::S3Storage;

#[derive(Debug, Error)]
pub enum StorageBackendError {
    #[error("invalid storage request: {0}")]
    Invalid(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StorageBackendResult<T> = Result<T, StorageBackendError>;

/// A presigned PUT request the client replays verbatim.
#[derive(Debug, Clone)]
pub struct PresignedPut {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Issue a time-limited write URL for `key`.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageBackendResult<PresignedPut>;

    /// Physically delete `key`. Deleting a missing key succeeds.
    async fn delete_object(&self, key: &str) -> StorageBackendResult<()>;
}

/// Deterministic mapping between object keys and public URLs.
///
/// A URL is *managed* when it lives under `base_url/`; everything else is an
/// externally hosted image this service must never touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicUrlScheme {
    base_url: String,
}

impl PublicUrlScheme {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn public_url(&self, object_key: &str) -> String {
        format!("{}/{}", self.base_url, object_key)
    }

    pub fn is_managed(&self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || self.base_url.is_empty() {
            return false;
        }
        url.strip_prefix(self.base_url.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Resolve the object key behind a managed URL.
    pub fn object_key(&self, url: &str) -> Option<String> {
        let url = url.trim();
        if !self.is_managed(url) {
            return None;
        }
        let key = url[self.base_url.len() + 1..].trim();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }
}
