//! Human-readable unique identifiers for catalog entities.
//!
//! Allocation probes `base`, `base-2`, `base-3`, ... against the collection.
//! The probe and the write are not atomic, so writers go through
//! [`SlugAllocator::save_with_unique_slug`], which re-allocates and retries
//! when the write loses a race on the slug's unique index.

use crate::{
    config::SlugConfig,
    db::unique_violation_column,
    models::catalog::Collection,
    services::catalog_repo::CatalogRepo,
};
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SlugError {
    #[error("unable to allocate unique slug for `{base}` after {probes} candidates")]
    Exhausted { base: String, probes: u32 },
    #[error("`{field}` already exists")]
    Conflict { field: String },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type SlugResult<T> = Result<T, SlugError>;

/// Lowercase ascii, runs of anything else collapsed into single hyphens,
/// no leading or trailing hyphen.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;
    for c in input.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Normalize `input`, falling back to the collection default when nothing
/// usable is left.
pub fn slug_base(input: &str, collection: Collection) -> String {
    let slug = slugify(input);
    if slug.is_empty() {
        collection.default_slug().to_string()
    } else {
        slug
    }
}

/// `base` for the first sequence number, `base-N` afterwards.
pub fn slug_candidate(base: &str, sequence: u32) -> String {
    if sequence <= 1 {
        base.to_string()
    } else {
        format!("{}-{}", base, sequence)
    }
}

#[derive(Clone)]
pub struct SlugAllocator {
    catalog: CatalogRepo,
    limits: SlugConfig,
}

impl SlugAllocator {
    pub fn new(catalog: CatalogRepo, limits: SlugConfig) -> Self {
        Self { catalog, limits }
    }

    /// First free candidate for `raw` in `collection`, ignoring `exclude_id`.
    pub async fn allocate(
        &self,
        collection: Collection,
        raw: &str,
        exclude_id: Option<Uuid>,
    ) -> SlugResult<String> {
        let base = slug_base(raw, collection);
        for sequence in 1..=self.limits.scan_limit {
            let candidate = slug_candidate(&base, sequence);
            if !self
                .catalog
                .slug_exists(collection, &candidate, exclude_id)
                .await?
            {
                return Ok(candidate);
            }
        }
        Err(SlugError::Exhausted {
            base,
            probes: self.limits.scan_limit,
        })
    }

    /// Allocate a slug and run `write` with it.
    ///
    /// A write rejected on the slug's unique index is retried with a freshly
    /// allocated slug, at most `save_retry_limit` more times. A rejection on
    /// any other unique column is reported as a conflict straight away.
    pub async fn save_with_unique_slug<T, F, Fut>(
        &self,
        collection: Collection,
        raw: &str,
        exclude_id: Option<Uuid>,
        mut write: F,
    ) -> SlugResult<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut slug = self.allocate(collection, raw, exclude_id).await?;
        let mut retries = 0;
        loop {
            let err = match write(slug.clone()).await {
                Ok(saved) => return Ok(saved),
                Err(err) => err,
            };

            match unique_violation_column(&err) {
                Some(column) if column == "slug" => {
                    if retries >= self.limits.save_retry_limit {
                        warn!(table = collection.table(), %slug, "slug retries exhausted");
                        return Err(SlugError::Conflict { field: column });
                    }
                    retries += 1;
                    debug!(
                        table = collection.table(),
                        %slug,
                        retries,
                        "slug taken at write, re-allocating"
                    );
                    slug = self.allocate(collection, raw, exclude_id).await?;
                }
                Some(column) => return Err(SlugError::Conflict { field: column }),
                None => return Err(SlugError::Database(err)),
            }
        }
    }
}
