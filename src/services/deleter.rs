//! Reference-counted deletion of managed objects.
//!
//! Decides, at call time, whether a public URL is safe to physically delete
//! and records the result in the registry. A failed physical delete is never
//! retried inline and never surfaces as an error: the row goes to
//! `pending_delete` and the orphan sweep picks it up later.

use crate::{
    models::upload_asset::{AssetModule, AssetStatus, UploadAsset},
    services::{
        asset_registry::{AssetRegistry, RegistryResult, Transition},
        catalog_repo::CatalogRepo,
    },
    storage::{ObjectStorage, PublicUrlScheme},
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const UNMANAGED_NOTE: &str = "unmanaged-url";
const UNRESOLVABLE_KEY: &str = "Invalid managed URL: cannot resolve object key";

#[derive(Debug, Clone)]
pub struct DeleteRequest<'a> {
    pub module: AssetModule,
    pub public_url: &'a str,
    /// Registry row the caller already holds; looked up by URL otherwise.
    pub asset_id: Option<Uuid>,
    pub check_reference: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyUrl,
    UnmanagedUrl,
    AlreadyDeleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Still referenced by some entity; promoted to `committed` if staged.
    Kept,
    PendingDelete { reason: String },
    Skipped(SkipReason),
}

/// Running totals over a batch of delete outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeTally {
    pub deleted: u64,
    pub kept: u64,
    pub pending_delete: u64,
}

impl OutcomeTally {
    pub fn record(&mut self, outcome: &DeleteOutcome) {
        match outcome {
            DeleteOutcome::Deleted => self.deleted += 1,
            DeleteOutcome::Kept => self.kept += 1,
            DeleteOutcome::PendingDelete { .. } => self.pending_delete += 1,
            DeleteOutcome::Skipped(_) => {}
        }
    }
}

#[derive(Clone)]
pub struct ReferenceCountedDeleter {
    registry: AssetRegistry,
    catalog: CatalogRepo,
    storage: Arc<dyn ObjectStorage>,
    urls: PublicUrlScheme,
}

impl ReferenceCountedDeleter {
    pub fn new(
        registry: AssetRegistry,
        catalog: CatalogRepo,
        storage: Arc<dyn ObjectStorage>,
        urls: PublicUrlScheme,
    ) -> Self {
        Self {
            registry,
            catalog,
            storage,
            urls,
        }
    }

    pub fn urls(&self) -> &PublicUrlScheme {
        &self.urls
    }

    /// Delete the object behind `request.public_url` unless something still
    /// references it.
    ///
    /// Only registry and catalog failures are returned as errors; storage
    /// failures become [`DeleteOutcome::PendingDelete`].
    pub async fn delete_managed_url(
        &self,
        request: DeleteRequest<'_>,
    ) -> RegistryResult<DeleteOutcome> {
        let url = request.public_url.trim();
        if url.is_empty() {
            return Ok(DeleteOutcome::Skipped(SkipReason::EmptyUrl));
        }

        let asset = match request.asset_id {
            Some(id) => self.registry.get(id).await?,
            None => self.registry.find_by_public_url(url).await?,
        };

        if let Some(asset) = &asset {
            if asset.status.is_terminal() {
                return Ok(DeleteOutcome::Skipped(SkipReason::AlreadyDeleted));
            }
        }

        if !self.urls.is_managed(url) {
            if let Some(asset) = &asset {
                self.registry
                    .transition(
                        asset.id,
                        &Transition::Delete {
                            note: UNMANAGED_NOTE.into(),
                        },
                    )
                    .await?;
            }
            return Ok(DeleteOutcome::Skipped(SkipReason::UnmanagedUrl));
        }

        if request.check_reference {
            let references = self.catalog.count_references(url).await?;
            if references > 0 {
                if let Some(asset) = &asset {
                    self.adopt(asset).await?;
                }
                debug!(
                    module = %request.module,
                    public_url = url,
                    references,
                    "asset still referenced, kept"
                );
                return Ok(DeleteOutcome::Kept);
            }
        }

        let Some(object_key) = self.urls.object_key(url) else {
            if let Some(asset) = &asset {
                self.registry
                    .transition(
                        asset.id,
                        &Transition::FailDelete {
                            error: UNRESOLVABLE_KEY.into(),
                        },
                    )
                    .await?;
            }
            warn!(module = %request.module, public_url = url, "cannot resolve object key");
            return Ok(DeleteOutcome::PendingDelete {
                reason: UNRESOLVABLE_KEY.into(),
            });
        };

        match self.storage.delete_object(&object_key).await {
            Ok(()) => {
                let transition = Transition::Delete { note: String::new() };
                self.record(asset.as_ref(), request.module, &object_key, url, &transition)
                    .await?;
                debug!(module = %request.module, %object_key, "deleted object");
                Ok(DeleteOutcome::Deleted)
            }
            Err(err) => {
                let reason = err.to_string();
                let transition = Transition::FailDelete {
                    error: reason.clone(),
                };
                self.record(asset.as_ref(), request.module, &object_key, url, &transition)
                    .await?;
                warn!(
                    module = %request.module,
                    %object_key,
                    error = %reason,
                    "delete failed, left for sweep"
                );
                Ok(DeleteOutcome::PendingDelete { reason })
            }
        }
    }

    /// Apply the delete result to the registry row, creating one for objects
    /// that were never registered.
    async fn record(
        &self,
        asset: Option<&UploadAsset>,
        module: AssetModule,
        object_key: &str,
        url: &str,
        transition: &Transition,
    ) -> RegistryResult<()> {
        match asset {
            Some(asset) => {
                self.registry.transition(asset.id, transition).await?;
            }
            None => {
                self.registry
                    .record_untracked(module, object_key, url, transition)
                    .await?
            }
        }
        Ok(())
    }

    /// A referenced asset is live: staged rows become committed, pending rows
    /// stay pending but move to the back of the sweep queue.
    async fn adopt(&self, asset: &UploadAsset) -> RegistryResult<()> {
        match asset.status {
            AssetStatus::Staged => {
                self.registry.transition(asset.id, &Transition::Commit).await?;
            }
            AssetStatus::PendingDelete => self.registry.touch(asset.id).await?,
            AssetStatus::Committed | AssetStatus::Deleted => {}
        }
        Ok(())
    }
}
