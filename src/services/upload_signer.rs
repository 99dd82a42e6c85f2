//! Presigned upload signer.
//!
//! Validates an upload request, derives a partitioned storage key, presigns a
//! short-lived PUT for it and registers the object as `staged`. Nothing is
//! persisted unless validation passes.

use crate::{
    config::{DEFAULT_MAX_FILE_SIZE_MB, DEFAULT_SIGN_EXPIRES_SECS, StorageConfig},
    models::upload_asset::AssetModule,
    services::asset_registry::{AssetRegistry, NewAsset},
    storage::{ObjectStorage, PublicUrlScheme},
};
use axum::http::StatusCode;
use chrono::{Datelike, Utc};
use serde::Serialize;
use std::{collections::BTreeMap, path::Path, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Accepted content types and their extensions; the first is canonical.
const ALLOWED_TYPES: [(&str, &[&str]); 4] = [
    ("image/jpeg", &[".jpg", ".jpeg"]),
    ("image/png", &[".png"]),
    ("image/webp", &[".webp"]),
    ("image/avif", &[".avif"]),
];

#[derive(Debug, Error)]
#[error("{message}")]
pub struct UploadSignError {
    pub message: String,
    pub status: StatusCode,
}

impl UploadSignError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Limits and naming inputs for signing.
#[derive(Debug, Clone)]
pub struct SignerSettings {
    pub environment: String,
    pub max_file_size_bytes: u64,
    pub sign_expires: Duration,
}

impl Default for SignerSettings {
    fn default() -> Self {
        Self {
            environment: "dev".into(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_MB * 1024 * 1024,
            sign_expires: Duration::from_secs(DEFAULT_SIGN_EXPIRES_SECS),
        }
    }
}

impl From<&StorageConfig> for SignerSettings {
    fn from(config: &StorageConfig) -> Self {
        Self {
            environment: config.environment.clone(),
            max_file_size_bytes: config.max_file_size_bytes,
            sign_expires: config.sign_expires,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignUploadRequest {
    pub module: AssetModule,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub draft_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUpload {
    pub upload_url: String,
    pub public_url: String,
    pub object_key: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct UploadSigner {
    storage: Arc<dyn ObjectStorage>,
    registry: AssetRegistry,
    urls: PublicUrlScheme,
    settings: SignerSettings,
}

impl UploadSigner {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        registry: AssetRegistry,
        urls: PublicUrlScheme,
        settings: SignerSettings,
    ) -> Self {
        Self {
            storage,
            registry,
            urls,
            settings,
        }
    }

    /// Issue a presigned PUT for a new object and stage it under the draft.
    pub async fn sign_upload(
        &self,
        request: &SignUploadRequest,
        created_by: &str,
    ) -> Result<SignedUpload, UploadSignError> {
        let draft_id = request.draft_id.trim();
        if draft_id.is_empty() {
            return Err(UploadSignError::bad_request("draftId is required"));
        }
        let filename = request.filename.trim();
        if filename.is_empty() {
            return Err(UploadSignError::bad_request("filename is required"));
        }
        let content_type = request.content_type.trim();
        if content_type.is_empty() {
            return Err(UploadSignError::bad_request("contentType is required"));
        }
        let Some(extensions) = allowed_extensions(content_type) else {
            return Err(UploadSignError::bad_request(
                "Unsupported image type. Allowed: jpg, png, webp, avif",
            ));
        };
        if request.size <= 0 {
            return Err(UploadSignError::bad_request("size must be a positive number"));
        }
        if request.size as u64 > self.settings.max_file_size_bytes {
            return Err(UploadSignError::bad_request(format!(
                "Image size exceeds limit ({}MB)",
                self.settings.max_file_size_bytes / (1024 * 1024)
            )));
        }
        let extension = resolve_extension(filename, extensions)?;

        let object_key = build_object_key(&self.settings.environment, request.module, extension);
        let presigned = self
            .storage
            .presign_put(&object_key, content_type, self.settings.sign_expires)
            .await
            .map_err(|err| {
                error!(module = %request.module, error = %err, "presign failed");
                UploadSignError::internal("Failed to sign upload request")
            })?;
        let public_url = self.urls.public_url(&object_key);

        self.registry
            .register_staged(&NewAsset {
                module: request.module,
                draft_id: draft_id.to_string(),
                object_key: object_key.clone(),
                public_url: public_url.clone(),
                content_type: content_type.to_string(),
                size_bytes: request.size,
                created_by: created_by.trim().to_string(),
            })
            .await
            .map_err(|err| {
                error!(
                    module = %request.module,
                    %object_key,
                    error = %err,
                    "registering staged asset failed"
                );
                UploadSignError::internal("Failed to sign upload request")
            })?;

        info!(module = %request.module, draft_id, %object_key, "signed upload");

        Ok(SignedUpload {
            upload_url: presigned.url,
            public_url,
            object_key,
            headers: presigned.headers,
        })
    }
}

fn allowed_extensions(content_type: &str) -> Option<&'static [&'static str]> {
    ALLOWED_TYPES
        .iter()
        .find(|(allowed, _)| *allowed == content_type)
        .map(|(_, extensions)| *extensions)
}

/// The filename's extension if it matches, the canonical one if it has none.
fn resolve_extension(
    filename: &str,
    extensions: &'static [&'static str],
) -> Result<&'static str, UploadSignError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()));

    match extension {
        None => Ok(extensions[0]),
        Some(ext) => extensions
            .iter()
            .copied()
            .find(|allowed| *allowed == ext)
            .ok_or_else(|| {
                UploadSignError::bad_request("File extension does not match contentType")
            }),
    }
}

/// `{environment}/{module}/{yyyy}/{mm}/{random-id}{extension}`
fn build_object_key(environment: &str, module: AssetModule, extension: &str) -> String {
    let now = Utc::now();
    format!(
        "{}/{}/{:04}/{:02}/{}{}",
        environment,
        module,
        now.year(),
        now.month(),
        Uuid::new_v4(),
        extension
    )
}
