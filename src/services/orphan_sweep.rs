//! Orphan sweep: bounded, repeatable cleanup of stale `staged` rows and
//! every `pending_delete` row.
//!
//! Each run handles at most one batch, oldest first. Items are processed one
//! at a time and a failing item never aborts the batch; repeated runs
//! converge on a registry with no orphans.

use crate::{
    config::SweepConfig,
    services::{
        asset_registry::{AssetRegistry, RegistryResult},
        deleter::{DeleteRequest, OutcomeTally, ReferenceCountedDeleter},
    },
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub processed: u64,
    pub deleted: u64,
    pub kept: u64,
    pub pending_delete: u64,
}

#[derive(Clone)]
pub struct OrphanSweep {
    registry: AssetRegistry,
    deleter: ReferenceCountedDeleter,
    defaults: SweepConfig,
}

impl OrphanSweep {
    pub fn new(
        registry: AssetRegistry,
        deleter: ReferenceCountedDeleter,
        defaults: SweepConfig,
    ) -> Self {
        Self {
            registry,
            deleter,
            defaults,
        }
    }

    /// Run one batch with the configured age and size.
    pub async fn run_default(&self) -> RegistryResult<SweepSummary> {
        self.run(self.defaults.staged_ttl_hours, self.defaults.batch_limit)
            .await
    }

    /// Run one batch. Zero for either argument means "use the configured
    /// value".
    pub async fn run(
        &self,
        staged_max_age_hours: u64,
        batch_limit: u32,
    ) -> RegistryResult<SweepSummary> {
        let hours = if staged_max_age_hours == 0 {
            self.defaults.staged_ttl_hours
        } else {
            staged_max_age_hours
        };
        let limit = if batch_limit == 0 {
            self.defaults.batch_limit
        } else {
            batch_limit
        };
        let cutoff = i64::try_from(hours)
            .ok()
            .and_then(Duration::try_hours)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let candidates = self.registry.stale_candidates(cutoff, limit).await?;
        let mut tally = OutcomeTally::default();
        for asset in &candidates {
            let outcome = self
                .deleter
                .delete_managed_url(DeleteRequest {
                    module: asset.module,
                    public_url: &asset.public_url,
                    asset_id: Some(asset.id),
                    check_reference: true,
                })
                .await;
            match outcome {
                Ok(outcome) => tally.record(&outcome),
                Err(err) => warn!(
                    id = %asset.id,
                    public_url = %asset.public_url,
                    error = %err,
                    "sweep item failed"
                ),
            }
        }

        let summary = SweepSummary {
            processed: candidates.len() as u64,
            deleted: tally.deleted,
            kept: tally.kept,
            pending_delete: tally.pending_delete,
        };
        info!(
            staged_max_age_hours = hours,
            batch_limit = limit,
            processed = summary.processed,
            deleted = summary.deleted,
            kept = summary.kept,
            pending_delete = summary.pending_delete,
            "orphan sweep finished"
        );
        Ok(summary)
    }
}
