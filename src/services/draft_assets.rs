//! Two-phase draft protocol: commit what an entity save kept, delete what it
//! dropped, and discard whole drafts on cancel.
//!
//! Every decision is re-derived from the registry and the catalog at call
//! time, so each operation is safe to repeat. Callers must only finalize
//! after the owning entity's write is durable.

use crate::{
    models::{catalog::normalize_url_list, upload_asset::AssetModule},
    services::{
        asset_registry::{AssetRegistry, RegistryResult, Transition},
        deleter::{DeleteRequest, OutcomeTally, ReferenceCountedDeleter},
    },
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeSummary {
    pub committed: u64,
    pub deleted: u64,
    pub kept: u64,
    pub pending_delete: u64,
}

/// Result of discard and cleanup runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub total: u64,
    pub deleted: u64,
    pub kept: u64,
    pub pending_delete: u64,
}

impl CleanupSummary {
    fn from_tally(total: usize, tally: OutcomeTally) -> Self {
        Self {
            total: total as u64,
            deleted: tally.deleted,
            kept: tally.kept,
            pending_delete: tally.pending_delete,
        }
    }
}

/// Inputs of a finalize run, taken from the save that just committed.
#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    pub module: AssetModule,
    pub draft_id: String,
    pub creator: String,
    /// Managed URLs of the entity after the save.
    pub used_urls: Vec<String>,
    /// Managed URLs of the entity before the edit; empty on create.
    pub previous_urls: Vec<String>,
}

#[derive(Clone)]
pub struct AssetLifecycle {
    registry: AssetRegistry,
    deleter: ReferenceCountedDeleter,
}

impl AssetLifecycle {
    pub fn new(registry: AssetRegistry, deleter: ReferenceCountedDeleter) -> Self {
        Self { registry, deleter }
    }

    fn managed(&self, urls: &[String]) -> Vec<String> {
        let scheme = self.deleter.urls();
        normalize_url_list(urls)
            .into_iter()
            .filter(|url| scheme.is_managed(url))
            .collect()
    }

    /// Run one deleter call, logging a registry failure instead of
    /// returning it so the rest of the batch still runs.
    async fn delete_logged(&self, request: DeleteRequest<'_>, tally: &mut OutcomeTally) {
        let module = request.module;
        let public_url = request.public_url;
        match self.deleter.delete_managed_url(request).await {
            Ok(outcome) => tally.record(&outcome),
            Err(err) => warn!(%module, public_url, error = %err, "asset cleanup item failed"),
        }
    }

    /// Settle the assets of a draft after its entity was saved.
    ///
    /// 1. staged draft rows whose URL the entity uses become `committed`;
    /// 2. the draft's remaining staged rows go through the deleter;
    /// 3. URLs the edit removed go through the deleter regardless of draft,
    ///    since they are usually committed assets from an earlier session.
    ///
    /// The phases are independent. A failing item is logged and skipped, and
    /// phase 3 runs even when a draft query fails; that query error is
    /// returned once every phase has run.
    pub async fn finalize_draft_assets(
        &self,
        request: &FinalizeRequest,
    ) -> RegistryResult<FinalizeSummary> {
        let module = request.module;
        let draft_id = request.draft_id.trim();
        let creator = request.creator.trim();
        let used = self.managed(&request.used_urls);
        let used_set: HashSet<&str> = used.iter().map(String::as_str).collect();

        let mut committed = 0;
        let mut tally = OutcomeTally::default();
        let mut query_error = None;

        if !draft_id.is_empty() && !creator.is_empty() {
            match self.registry.staged_for_draft(module, draft_id, creator).await {
                Ok(staged) => {
                    let used_rows = staged
                        .iter()
                        .filter(|asset| used_set.contains(asset.public_url.as_str()));
                    for asset in used_rows {
                        match self.registry.transition(asset.id, &Transition::Commit).await {
                            Ok(true) => committed += 1,
                            Ok(false) => {}
                            Err(err) => {
                                warn!(%module, id = %asset.id, error = %err, "commit failed")
                            }
                        }
                    }
                }
                Err(err) => {
                    error!(%module, draft_id, error = %err, "loading draft assets failed");
                    query_error = Some(err);
                }
            }

            if query_error.is_none() {
                match self.registry.staged_for_draft(module, draft_id, creator).await {
                    Ok(leftover) => {
                        for asset in &leftover {
                            let request = DeleteRequest {
                                module,
                                public_url: &asset.public_url,
                                asset_id: Some(asset.id),
                                check_reference: true,
                            };
                            self.delete_logged(request, &mut tally).await;
                        }
                    }
                    Err(err) => {
                        error!(
                            %module,
                            draft_id,
                            error = %err,
                            "loading unused draft assets failed"
                        );
                        query_error = Some(err);
                    }
                }
            }
        }

        let removed: Vec<String> = self
            .managed(&request.previous_urls)
            .into_iter()
            .filter(|url| !used_set.contains(url.as_str()))
            .collect();
        for url in &removed {
            let request = DeleteRequest {
                module,
                public_url: url,
                asset_id: None,
                check_reference: true,
            };
            self.delete_logged(request, &mut tally).await;
        }

        let summary = FinalizeSummary {
            committed,
            deleted: tally.deleted,
            kept: tally.kept,
            pending_delete: tally.pending_delete,
        };
        info!(
            %module,
            draft_id,
            removed = removed.len(),
            committed = summary.committed,
            deleted = summary.deleted,
            kept = summary.kept,
            pending_delete = summary.pending_delete,
            "finalized draft assets"
        );
        match query_error {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    /// Drop every staged asset of a cancelled draft that nothing references.
    pub async fn discard_draft_assets(
        &self,
        module: AssetModule,
        draft_id: &str,
        creator: &str,
    ) -> RegistryResult<CleanupSummary> {
        let draft_id = draft_id.trim();
        let creator = creator.trim();
        if draft_id.is_empty() || creator.is_empty() {
            return Ok(CleanupSummary::default());
        }

        let staged = self.registry.staged_for_draft(module, draft_id, creator).await?;
        let mut tally = OutcomeTally::default();
        for asset in &staged {
            let request = DeleteRequest {
                module,
                public_url: &asset.public_url,
                asset_id: Some(asset.id),
                check_reference: true,
            };
            self.delete_logged(request, &mut tally).await;
        }

        let summary = CleanupSummary::from_tally(staged.len(), tally);
        info!(
            %module,
            draft_id,
            total = summary.total,
            deleted = summary.deleted,
            kept = summary.kept,
            pending_delete = summary.pending_delete,
            "discarded draft assets"
        );
        Ok(summary)
    }

    /// Delete the given URLs unless still referenced, e.g. after an entity
    /// was removed. Per-URL failures are logged and skipped.
    pub async fn cleanup_unreferenced_urls(
        &self,
        module: AssetModule,
        urls: &[String],
    ) -> RegistryResult<CleanupSummary> {
        let urls = self.managed(urls);
        let mut tally = OutcomeTally::default();
        for url in &urls {
            let request = DeleteRequest {
                module,
                public_url: url,
                asset_id: None,
                check_reference: true,
            };
            self.delete_logged(request, &mut tally).await;
        }

        let summary = CleanupSummary::from_tally(urls.len(), tally);
        info!(
            %module,
            total = summary.total,
            deleted = summary.deleted,
            kept = summary.kept,
            pending_delete = summary.pending_delete,
            "cleaned up unreferenced urls"
        );
        Ok(summary)
    }

    /// Entity-save hook: finalize, logging instead of failing the save.
    pub async fn after_save(&self, request: &FinalizeRequest) -> Option<FinalizeSummary> {
        match self.finalize_draft_assets(request).await {
            Ok(summary) => Some(summary),
            Err(err) => {
                error!(
                    module = %request.module,
                    draft_id = %request.draft_id,
                    error = %err,
                    "finalize draft assets failed"
                );
                None
            }
        }
    }

    /// Entity-delete hook: clean up the removed entity's images.
    pub async fn after_delete(
        &self,
        module: AssetModule,
        urls: &[String],
    ) -> Option<CleanupSummary> {
        if urls.is_empty() {
            return Some(CleanupSummary::default());
        }
        match self.cleanup_unreferenced_urls(module, urls).await {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!(%module, error = %err, "cleanup after delete failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        models::{catalog::CategoryDraft, upload_asset::{AssetStatus, UploadAsset}},
        services::{asset_registry::NewAsset, catalog_repo::CatalogRepo},
        storage::{MemoryStorage, PublicUrlScheme},
    };
    use sqlx::SqlitePool;
    use std::sync::Arc;

    const BASE: &str = "https://cdn.example.com";

    struct Fixture {
        lifecycle: AssetLifecycle,
        registry: AssetRegistry,
        catalog: CatalogRepo,
        storage: MemoryStorage,
        pool: SqlitePool,
    }

    async fn fixture() -> Fixture {
        let pool = db::memory_pool().await.unwrap();
        let registry = AssetRegistry::new(pool.clone());
        let catalog = CatalogRepo::new(pool.clone());
        let storage = MemoryStorage::new();
        let deleter = ReferenceCountedDeleter::new(
            registry.clone(),
            catalog.clone(),
            Arc::new(storage.clone()),
            PublicUrlScheme::new(BASE),
        );
        Fixture {
            lifecycle: AssetLifecycle::new(registry.clone(), deleter),
            registry,
            catalog,
            storage,
            pool,
        }
    }

    /// Make every status update of the row with `object_key` abort.
    async fn lock_row(fx: &Fixture, object_key: &str) {
        let sql = format!(
            "CREATE TRIGGER lock_row BEFORE UPDATE ON upload_assets \
             WHEN OLD.object_key = '{object_key}' \
             BEGIN SELECT RAISE(ABORT, 'row is locked'); END"
        );
        sqlx::query(&sql).execute(&fx.pool).await.unwrap();
    }

    async fn stage(fx: &Fixture, draft_id: &str, key: &str) -> UploadAsset {
        fx.storage.put_object(key, vec![1u8]);
        fx.registry
            .register_staged(&NewAsset {
                module: AssetModule::Categories,
                draft_id: draft_id.into(),
                object_key: key.into(),
                public_url: format!("{}/{}", BASE, key),
                content_type: "image/png".into(),
                size_bytes: 1,
                created_by: "user-1".into(),
            })
            .await
            .unwrap()
    }

    fn finalize(draft_id: &str, used: &[&str], previous: &[&str]) -> FinalizeRequest {
        FinalizeRequest {
            module: AssetModule::Categories,
            draft_id: draft_id.into(),
            creator: "user-1".into(),
            used_urls: used.iter().map(|url| url.to_string()).collect(),
            previous_urls: previous.iter().map(|url| url.to_string()).collect(),
        }
    }

    async fn status(fx: &Fixture, asset: &UploadAsset) -> AssetStatus {
        fx.registry.get(asset.id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn finalize_commits_used_and_drops_unused() {
        let fx = fixture().await;
        let kept = stage(&fx, "d1", "dev/categories/a.png").await;
        let dropped = stage(&fx, "d1", "dev/categories/b.png").await;
        fx.catalog
            .insert_category(
                "towing",
                &CategoryDraft {
                    name: "Towing".into(),
                    card_image: kept.public_url.clone(),
                },
            )
            .await
            .unwrap();

        let summary = fx
            .lifecycle
            .finalize_draft_assets(&finalize("d1", &[&kept.public_url], &[]))
            .await
            .unwrap();

        assert_eq!(
            summary,
            FinalizeSummary {
                committed: 1,
                deleted: 1,
                kept: 0,
                pending_delete: 0
            }
        );
        assert_eq!(status(&fx, &kept).await, AssetStatus::Committed);
        assert_eq!(status(&fx, &dropped).await, AssetStatus::Deleted);
        assert!(fx.storage.contains("dev/categories/a.png"));
        assert!(!fx.storage.contains("dev/categories/b.png"));
    }

    #[tokio::test]
    async fn finalize_without_draft_still_removes_replaced_urls() {
        let fx = fixture().await;
        let old = stage(&fx, "d0", "dev/categories/old.png").await;
        fx.registry.transition(old.id, &Transition::Commit).await.unwrap();
        let unrelated = stage(&fx, "d1", "dev/categories/other.png").await;

        let summary = fx
            .lifecycle
            .finalize_draft_assets(&finalize("", &[], &[&old.public_url]))
            .await
            .unwrap();

        assert_eq!(summary.committed, 0);
        assert_eq!(summary.deleted, 1);
        assert_eq!(status(&fx, &old).await, AssetStatus::Deleted);
        assert_eq!(status(&fx, &unrelated).await, AssetStatus::Staged);
    }

    #[tokio::test]
    async fn discard_removes_only_the_callers_draft() {
        let fx = fixture().await;
        let mine = stage(&fx, "d1", "dev/categories/a.png").await;
        let other = stage(&fx, "d2", "dev/categories/b.png").await;

        let summary = fx
            .lifecycle
            .discard_draft_assets(AssetModule::Categories, "d1", "user-1")
            .await
            .unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(status(&fx, &mine).await, AssetStatus::Deleted);
        assert_eq!(status(&fx, &other).await, AssetStatus::Staged);

        let wrong_creator = fx
            .lifecycle
            .discard_draft_assets(AssetModule::Categories, "d2", "someone-else")
            .await
            .unwrap();
        assert_eq!(wrong_creator.total, 0);
    }

    #[tokio::test]
    async fn discard_with_empty_identity_is_a_no_op() {
        let fx = fixture().await;
        stage(&fx, "d1", "dev/categories/a.png").await;

        let summary = fx
            .lifecycle
            .discard_draft_assets(AssetModule::Categories, " ", "user-1")
            .await
            .unwrap();
        assert_eq!(summary, CleanupSummary::default());
        assert_eq!(fx.storage.delete_calls(), 0);
    }

    #[tokio::test]
    async fn cleanup_counts_unique_managed_urls() {
        let fx = fixture().await;
        let asset = stage(&fx, "d1", "dev/categories/a.png").await;
        let urls = vec![
            asset.public_url.clone(),
            format!(" {} ", asset.public_url),
            "https://elsewhere.test/x.png".to_string(),
            String::new(),
        ];

        let summary = fx
            .lifecycle
            .cleanup_unreferenced_urls(AssetModule::Categories, &urls)
            .await
            .unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(fx.storage.delete_calls(), 1);
    }

    #[tokio::test]
    async fn failed_delete_is_reported_pending() {
        let fx = fixture().await;
        let asset = stage(&fx, "d1", "dev/categories/a.png").await;
        fx.storage.set_fail_deletes(true);

        let summary = fx
            .lifecycle
            .after_delete(AssetModule::Categories, &[asset.public_url.clone()])
            .await
            .unwrap();
        assert_eq!(summary.pending_delete, 1);
        assert_eq!(status(&fx, &asset).await, AssetStatus::PendingDelete);
    }

    #[tokio::test]
    async fn replaced_url_is_removed_even_if_a_draft_row_fails() {
        let fx = fixture().await;
        let old = stage(&fx, "d1", "dev/categories/old.png").await;
        fx.registry.transition(old.id, &Transition::Commit).await.unwrap();
        let stuck = stage(&fx, "d2", "dev/categories/stuck.png").await;
        lock_row(&fx, "dev/categories/stuck.png").await;

        let summary = fx
            .lifecycle
            .after_save(&finalize("d2", &[], &[&old.public_url]))
            .await
            .expect("finalize should report a summary");

        assert_eq!(summary.deleted, 1);
        assert_eq!(status(&fx, &old).await, AssetStatus::Deleted);
        assert!(!fx.storage.contains("dev/categories/old.png"));
        assert_eq!(status(&fx, &stuck).await, AssetStatus::Staged);
    }

    #[tokio::test]
    async fn cleanup_continues_past_a_failing_url() {
        let fx = fixture().await;
        let first = stage(&fx, "d1", "dev/categories/a.png").await;
        let second = stage(&fx, "d1", "dev/categories/b.png").await;
        lock_row(&fx, "dev/categories/a.png").await;

        let summary = fx
            .lifecycle
            .after_delete(
                AssetModule::Categories,
                &[first.public_url.clone(), second.public_url.clone()],
            )
            .await
            .unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.deleted, 1);
        assert_eq!(status(&fx, &first).await, AssetStatus::Staged);
        assert_eq!(status(&fx, &second).await, AssetStatus::Deleted);
    }
}
