//! Entity write path for products and categories.
//!
//! Every save allocates a unique slug, writes the row and then settles the
//! draft's uploads against what the entity now references. Asset cleanup is
//! best effort: a failure there is logged and never fails the save.

use crate::{
    db::unique_violation_column,
    models::{
        catalog::{Category, CategoryDraft, Collection, Product, ProductDraft},
        upload_asset::AssetModule,
    },
    services::{
        catalog_repo::CatalogRepo,
        draft_assets::{AssetLifecycle, FinalizeRequest},
        slug_allocator::{SlugAllocator, SlugError, slug_base},
    },
    storage::PublicUrlScheme,
};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Invalid(String),
    #[error("`{0}` already exists")]
    Conflict(String),
    #[error("unable to allocate unique slug for `{0}`")]
    SlugExhausted(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl From<SlugError> for CatalogError {
    fn from(err: SlugError) -> Self {
        match err {
            SlugError::Exhausted { base, .. } => CatalogError::SlugExhausted(base),
            SlugError::Conflict { field } => CatalogError::Conflict(field),
            SlugError::Database(err) => CatalogError::Database(err),
        }
    }
}

fn write_error(err: sqlx::Error) -> CatalogError {
    match unique_violation_column(&err) {
        Some(column) => CatalogError::Conflict(column),
        None => CatalogError::Database(err),
    }
}

/// Upload session a write belongs to.
#[derive(Debug, Clone, Default)]
pub struct DraftContext {
    pub draft_id: String,
    pub creator: String,
}

#[derive(Clone)]
pub struct CatalogService {
    catalog: CatalogRepo,
    slugs: SlugAllocator,
    lifecycle: AssetLifecycle,
    urls: PublicUrlScheme,
}

impl CatalogService {
    pub fn new(
        catalog: CatalogRepo,
        slugs: SlugAllocator,
        lifecycle: AssetLifecycle,
        urls: PublicUrlScheme,
    ) -> Self {
        Self {
            catalog,
            slugs,
            lifecycle,
            urls,
        }
    }

    pub async fn get_category(&self, id: Uuid) -> CatalogResult<Category> {
        self.catalog
            .get_category(id)
            .await?
            .ok_or(CatalogError::NotFound("Category"))
    }

    pub async fn create_category(
        &self,
        requested_slug: &str,
        draft: &CategoryDraft,
        ctx: &DraftContext,
    ) -> CatalogResult<Category> {
        validate_category(draft)?;
        let raw = slug_source(requested_slug, &draft.name);
        let created = self
            .slugs
            .save_with_unique_slug(Collection::Categories, raw, None, |slug| async move {
                self.catalog.insert_category(&slug, draft).await
            })
            .await?;

        info!(id = %created.id, slug = %created.slug, "category created");
        self.settle(AssetModule::Categories, ctx, Vec::new(), created.managed_urls(&self.urls))
            .await;
        Ok(created)
    }

    pub async fn update_category(
        &self,
        id: Uuid,
        requested_slug: &str,
        draft: &CategoryDraft,
        ctx: &DraftContext,
    ) -> CatalogResult<Category> {
        validate_category(draft)?;
        let existing = self.get_category(id).await?;
        let raw = slug_source(requested_slug, &draft.name);

        let updated = if slug_base(raw, Collection::Categories) == existing.slug {
            self.catalog
                .update_category(id, &existing.slug, draft)
                .await
                .map_err(write_error)?
        } else {
            self.slugs
                .save_with_unique_slug(Collection::Categories, raw, Some(id), |slug| async move {
                    self.catalog.update_category(id, &slug, draft).await
                })
                .await?
        }
        .ok_or(CatalogError::NotFound("Category"))?;

        info!(%id, slug = %updated.slug, "category updated");
        self.settle(
            AssetModule::Categories,
            ctx,
            existing.managed_urls(&self.urls),
            updated.managed_urls(&self.urls),
        )
        .await;
        Ok(updated)
    }

    pub async fn delete_category(&self, id: Uuid) -> CatalogResult<Category> {
        let removed = self
            .catalog
            .delete_category(id)
            .await?
            .ok_or(CatalogError::NotFound("Category"))?;
        info!(%id, slug = %removed.slug, "category deleted");
        self.lifecycle
            .after_delete(AssetModule::Categories, &removed.managed_urls(&self.urls))
            .await;
        Ok(removed)
    }

    pub async fn get_product(&self, id: Uuid) -> CatalogResult<Product> {
        self.catalog
            .get_product(id)
            .await?
            .ok_or(CatalogError::NotFound("Product"))
    }

    pub async fn create_product(
        &self,
        requested_slug: &str,
        draft: &ProductDraft,
        ctx: &DraftContext,
    ) -> CatalogResult<Product> {
        validate_product(draft)?;
        let raw = slug_source(requested_slug, &draft.name);
        let created = self
            .slugs
            .save_with_unique_slug(Collection::Products, raw, None, |slug| async move {
                self.catalog.insert_product(&slug, draft).await
            })
            .await?;

        info!(id = %created.id, slug = %created.slug, "product created");
        self.settle(AssetModule::Products, ctx, Vec::new(), created.managed_urls(&self.urls))
            .await;
        Ok(created)
    }

    pub async fn update_product(
        &self,
        id: Uuid,
        requested_slug: &str,
        draft: &ProductDraft,
        ctx: &DraftContext,
    ) -> CatalogResult<Product> {
        validate_product(draft)?;
        let existing = self.get_product(id).await?;
        let raw = slug_source(requested_slug, &draft.name);

        let updated = if slug_base(raw, Collection::Products) == existing.slug {
            self.catalog
                .update_product(id, &existing.slug, draft)
                .await
                .map_err(write_error)?
        } else {
            self.slugs
                .save_with_unique_slug(Collection::Products, raw, Some(id), |slug| async move {
                    self.catalog.update_product(id, &slug, draft).await
                })
                .await?
        }
        .ok_or(CatalogError::NotFound("Product"))?;

        info!(%id, slug = %updated.slug, "product updated");
        self.settle(
            AssetModule::Products,
            ctx,
            existing.managed_urls(&self.urls),
            updated.managed_urls(&self.urls),
        )
        .await;
        Ok(updated)
    }

    pub async fn delete_product(&self, id: Uuid) -> CatalogResult<Product> {
        let removed = self
            .catalog
            .delete_product(id)
            .await?
            .ok_or(CatalogError::NotFound("Product"))?;
        info!(%id, slug = %removed.slug, "product deleted");
        self.lifecycle
            .after_delete(AssetModule::Products, &removed.managed_urls(&self.urls))
            .await;
        Ok(removed)
    }

    async fn settle(
        &self,
        module: AssetModule,
        ctx: &DraftContext,
        previous_urls: Vec<String>,
        used_urls: Vec<String>,
    ) {
        self.lifecycle
            .after_save(&FinalizeRequest {
                module,
                draft_id: ctx.draft_id.clone(),
                creator: ctx.creator.clone(),
                used_urls,
                previous_urls,
            })
            .await;
    }
}

/// An explicit slug wins over the name.
fn slug_source<'a>(requested: &'a str, name: &'a str) -> &'a str {
    let requested = requested.trim();
    if requested.is_empty() { name } else { requested }
}

fn validate_category(draft: &CategoryDraft) -> CatalogResult<()> {
    if draft.name.trim().is_empty() {
        return Err(CatalogError::Invalid("Missing required fields (name)".into()));
    }
    Ok(())
}

fn validate_product(draft: &ProductDraft) -> CatalogResult<()> {
    if draft.name.trim().is_empty() || draft.sku.trim().is_empty() {
        return Err(CatalogError::Invalid("Missing required fields (name, sku)".into()));
    }
    Ok(())
}
