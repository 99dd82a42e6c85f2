//! CRUD handlers for the owning entities. Each write carries the
//! `uploadDraftId` of the edit session whose uploads it settles.

use crate::{
    errors::AppError,
    handlers::upload_handlers::principal,
    models::catalog::{Category, CategoryDraft, Product, ProductDraft},
    services::{AppState, catalog_service::DraftContext},
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryBody {
    pub slug: String,
    pub name: String,
    pub card_image: String,
    pub upload_draft_id: String,
}

impl CategoryBody {
    fn draft(&self) -> CategoryDraft {
        CategoryDraft {
            name: self.name.clone(),
            card_image: self.card_image.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductBody {
    pub slug: String,
    pub name: String,
    pub sku: String,
    pub image: String,
    pub gallery_images: Vec<String>,
    pub upload_draft_id: String,
}

impl ProductBody {
    fn draft(&self) -> ProductDraft {
        ProductDraft {
            name: self.name.clone(),
            sku: self.sku.clone(),
            image: self.image.clone(),
            gallery_images: self.gallery_images.clone(),
        }
    }
}

fn draft_context(headers: &HeaderMap, upload_draft_id: &str) -> DraftContext {
    DraftContext {
        draft_id: upload_draft_id.trim().to_string(),
        creator: principal(headers).unwrap_or_default(),
    }
}

/// `GET /categories/{id}`
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Category>, AppError> {
    Ok(Json(state.catalog.get_category(id).await?))
}

/// `POST /categories`
pub async fn create_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CategoryBody>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let ctx = draft_context(&headers, &body.upload_draft_id);
    let created = state
        .catalog
        .create_category(&body.slug, &body.draft(), &ctx)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /categories/{id}`
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<CategoryBody>,
) -> Result<Json<Category>, AppError> {
    let ctx = draft_context(&headers, &body.upload_draft_id);
    let updated = state
        .catalog
        .update_category(id, &body.slug, &body.draft(), &ctx)
        .await?;
    Ok(Json(updated))
}

/// `DELETE /categories/{id}`
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Category>, AppError> {
    Ok(Json(state.catalog.delete_category(id).await?))
}

/// `GET /products/{id}`
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog.get_product(id).await?))
}

/// `POST /products`
pub async fn create_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ProductBody>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let ctx = draft_context(&headers, &body.upload_draft_id);
    let created = state
        .catalog
        .create_product(&body.slug, &body.draft(), &ctx)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /products/{id}`
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<ProductBody>,
) -> Result<Json<Product>, AppError> {
    let ctx = draft_context(&headers, &body.upload_draft_id);
    let updated = state
        .catalog
        .update_product(id, &body.slug, &body.draft(), &ctx)
        .await?;
    Ok(Json(updated))
}

/// `DELETE /products/{id}`
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog.delete_product(id).await?))
}
