use crate::{
    models::upload_asset::InvalidModule,
    services::{
        asset_registry::RegistryError, catalog_service::CatalogError,
        upload_signer::UploadSignError,
    },
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Error returned by handlers; rendered as `{"error": ..., "status": ...}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<UploadSignError> for AppError {
    fn from(err: UploadSignError) -> Self {
        AppError::new(err.status, err.message)
    }
}

impl From<InvalidModule> for AppError {
    fn from(err: InvalidModule) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        tracing::error!(error = %err, "registry failure");
        AppError::internal("Failed to process upload assets")
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => AppError::new(StatusCode::NOT_FOUND, err.to_string()),
            CatalogError::Invalid(message) => AppError::bad_request(message),
            CatalogError::Conflict(_) | CatalogError::SlugExhausted(_) => {
                AppError::new(StatusCode::CONFLICT, err.to_string())
            }
            CatalogError::Database(err) => {
                tracing::error!(error = %err, "catalog write failed");
                AppError::internal("Internal server error")
            }
        }
    }
}
