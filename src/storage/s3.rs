//! S3-compatible backend (Cloudflare R2) built on the AWS SDK.

use super::{ObjectStorage, PresignedPut, StorageBackendError, StorageBackendResult};
use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{Client, error::DisplayErrorContext, presigning::PresigningConfig};
use std::{collections::BTreeMap, time::Duration};
use tracing::debug;

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Build a client for the account's R2 endpoint. Called once per process.
    pub async fn connect(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "r2",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint_url())
            .load()
            .await;

        let client = Client::from_conf(aws_sdk_s3::config::Builder::from(&aws_config).build());
        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageBackendResult<PresignedPut> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|err| StorageBackendError::Invalid(err.to_string()))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|err| StorageBackendError::Backend(DisplayErrorContext(&err).to_string()))?;

        let mut headers: BTreeMap<String, String> = request
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        if !headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type"))
        {
            headers.insert("Content-Type".to_string(), content_type.to_string());
        }

        Ok(PresignedPut {
            url: request.uri().to_string(),
            headers,
        })
    }

    async fn delete_object(&self, key: &str) -> StorageBackendResult<()> {
        if key.trim().is_empty() {
            return Err(StorageBackendError::Invalid("object key is required".into()));
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| StorageBackendError::Backend(DisplayErrorContext(&err).to_string()))?;

        debug!(bucket = %self.bucket, key, "deleted object");
        Ok(())
    }
}
