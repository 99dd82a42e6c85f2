//! HTTP handlers for presigned uploads and draft discard.
//! The uploading principal comes from the `x-principal-id` header set by the
//! upstream auth layer.

use crate::{
    errors::AppError,
    models::upload_asset::AssetModule,
    services::{
        AppState,
        draft_assets::CleanupSummary,
        upload_signer::{SignUploadRequest, SignedUpload},
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Deserialize;

pub const PRINCIPAL_HEADER: &str = "x-principal-id";

/// Body of `POST /uploads/{module}/sign`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignUploadBody {
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub draft_id: String,
}

/// Body of `POST /uploads/{module}/discard`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscardBody {
    pub draft_id: String,
}

/// Principal id from the request headers, if present and non-blank.
pub fn principal(headers: &HeaderMap) -> Option<String> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn require_principal(headers: &HeaderMap) -> Result<String, AppError> {
    principal(headers).ok_or_else(|| AppError::unauthorized("Unauthorized"))
}

/// `POST /uploads/{module}/sign`
pub async fn sign_upload(
    State(state): State<AppState>,
    Path(module): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SignUploadBody>,
) -> Result<Json<SignedUpload>, AppError> {
    let principal = require_principal(&headers)?;
    let module: AssetModule = module.parse()?;

    let request = SignUploadRequest {
        module,
        filename: body.filename,
        content_type: body.content_type,
        size: body.size,
        draft_id: body.draft_id,
    };
    let signed = state.signer.sign_upload(&request, &principal).await?;
    Ok(Json(signed))
}

/// `POST /uploads/{module}/discard`
pub async fn discard_draft(
    State(state): State<AppState>,
    Path(module): Path<String>,
    headers: HeaderMap,
    Json(body): Json<DiscardBody>,
) -> Result<Json<CleanupSummary>, AppError> {
    let principal = require_principal(&headers)?;
    let module: AssetModule = module.parse()?;

    let summary = state
        .lifecycle
        .discard_draft_assets(module, &body.draft_id, &principal)
        .await?;
    Ok(Json(summary))
}
