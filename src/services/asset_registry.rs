//! AssetRegistry: the persistent record of every issued object.
//!
//! All status writes go through [`AssetRegistry::transition`], which only
//! updates a row whose current status is a legal predecessor of the target.
//! The guard lives in the `WHERE` clause, so concurrent callers racing on the
//! same row can never move it backwards.

use crate::models::upload_asset::{AssetModule, AssetStatus, UploadAsset};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const ASSET_COLUMNS: &str = "id, module, draft_id, object_key, public_url, content_type, \
     size_bytes, created_by, status, delete_attempts, last_delete_error, committed_at, \
     deleted_at, created_at, updated_at";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Fields recorded when a write URL is issued.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub module: AssetModule,
    pub draft_id: String,
    pub object_key: String,
    pub public_url: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_by: String,
}

/// A status change and the bookkeeping that goes with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Confirmed in use; stamps `committed_at` and clears the last error.
    Commit,
    /// Physical object is gone (or was never ours); stamps `deleted_at`.
    Delete { note: String },
    /// Delete attempt failed; bumps `delete_attempts` and records the error.
    FailDelete { error: String },
}

impl Transition {
    pub fn target(&self) -> AssetStatus {
        match self {
            Transition::Commit => AssetStatus::Committed,
            Transition::Delete { .. } => AssetStatus::Deleted,
            Transition::FailDelete { .. } => AssetStatus::PendingDelete,
        }
    }
}

#[derive(Clone)]
pub struct AssetRegistry {
    db: SqlitePool,
}

impl AssetRegistry {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record a freshly signed object as `staged`.
    ///
    /// Keyed by `object_key`: a retried registration for the same key updates
    /// the staged row in place, and never touches a row that already left
    /// `staged`.
    pub async fn register_staged(&self, asset: &NewAsset) -> RegistryResult<UploadAsset> {
        let draft_id = asset.draft_id.trim();
        let object_key = asset.object_key.trim();
        let public_url = asset.public_url.trim();
        if draft_id.is_empty() {
            return Err(RegistryError::InvalidRegistration("draftId is required".into()));
        }
        if object_key.is_empty() {
            return Err(RegistryError::InvalidRegistration("objectKey is required".into()));
        }
        if public_url.is_empty() {
            return Err(RegistryError::InvalidRegistration("publicUrl is required".into()));
        }

        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO upload_assets (
                id, module, draft_id, object_key, public_url, content_type, size_bytes,
                created_by, status, delete_attempts, last_delete_error, committed_at,
                deleted_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, '', NULL, NULL, ?, ?)
            ON CONFLICT(object_key) DO UPDATE SET
                draft_id = excluded.draft_id,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                created_by = excluded.created_by,
                updated_at = excluded.updated_at
            WHERE upload_assets.status = 'staged'
            RETURNING {ASSET_COLUMNS}
            "#
        );

        let upserted = sqlx::query_as::<_, UploadAsset>(&sql)
            .bind(Uuid::new_v4())
            .bind(asset.module)
            .bind(draft_id)
            .bind(object_key)
            .bind(public_url)
            .bind(asset.content_type.trim())
            .bind(asset.size_bytes.max(0))
            .bind(asset.created_by.trim())
            .bind(AssetStatus::Staged)
            .bind(now)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;

        match upserted {
            Some(row) => Ok(row),
            None => {
                debug!(object_key, "registration hit a row that already left staged");
                self.find_by_object_key(object_key)
                    .await?
                    .ok_or(RegistryError::Sqlx(sqlx::Error::RowNotFound))
            }
        }
    }

    /// Record the outcome of a delete for a managed object that was never
    /// registered, so repeated cleanups see it and the sweep can retry it.
    /// An existing row for the key or URL is left untouched.
    pub async fn record_untracked(
        &self,
        module: AssetModule,
        object_key: &str,
        public_url: &str,
        transition: &Transition,
    ) -> RegistryResult<()> {
        let now = Utc::now();
        let (deleted_at, attempts, note) = match transition {
            Transition::Delete { note } => (Some(now), 0_i64, note.trim()),
            Transition::FailDelete { error } => (None, 1, error.trim()),
            Transition::Commit => {
                return Err(RegistryError::InvalidRegistration(
                    "untracked objects are never committed".into(),
                ));
            }
        };

        let result = sqlx::query(
            r#"
            INSERT INTO upload_assets (
                id, module, draft_id, object_key, public_url, content_type, size_bytes,
                created_by, status, delete_attempts, last_delete_error, committed_at,
                deleted_at, created_at, updated_at
            ) VALUES (?, ?, '', ?, ?, '', 0, '', ?, ?, ?, NULL, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(module)
        .bind(object_key.trim())
        .bind(public_url.trim())
        .bind(transition.target())
        .bind(attempts)
        .bind(note)
        .bind(deleted_at)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 1 {
            debug!(object_key, status = %transition.target(), "recorded untracked object");
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> RegistryResult<Option<UploadAsset>> {
        let sql = format!("SELECT {ASSET_COLUMNS} FROM upload_assets WHERE id = ?");
        Ok(sqlx::query_as::<_, UploadAsset>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    pub async fn find_by_object_key(
        &self,
        object_key: &str,
    ) -> RegistryResult<Option<UploadAsset>> {
        let sql = format!("SELECT {ASSET_COLUMNS} FROM upload_assets WHERE object_key = ?");
        Ok(sqlx::query_as::<_, UploadAsset>(&sql)
            .bind(object_key.trim())
            .fetch_optional(&self.db)
            .await?)
    }

    pub async fn find_by_public_url(
        &self,
        public_url: &str,
    ) -> RegistryResult<Option<UploadAsset>> {
        let sql = format!("SELECT {ASSET_COLUMNS} FROM upload_assets WHERE public_url = ?");
        Ok(sqlx::query_as::<_, UploadAsset>(&sql)
            .bind(public_url.trim())
            .fetch_optional(&self.db)
            .await?)
    }

    /// Staged rows of one edit session, oldest first.
    pub async fn staged_for_draft(
        &self,
        module: AssetModule,
        draft_id: &str,
        created_by: &str,
    ) -> RegistryResult<Vec<UploadAsset>> {
        let sql = format!(
            "SELECT {ASSET_COLUMNS} FROM upload_assets
             WHERE module = ? AND draft_id = ? AND created_by = ? AND status = ?
             ORDER BY created_at ASC"
        );
        Ok(sqlx::query_as::<_, UploadAsset>(&sql)
            .bind(module)
            .bind(draft_id)
            .bind(created_by)
            .bind(AssetStatus::Staged)
            .fetch_all(&self.db)
            .await?)
    }

    /// Sweep candidates: `staged` rows untouched since `staged_before`, plus
    /// every `pending_delete` row, least recently updated first.
    pub async fn stale_candidates(
        &self,
        staged_before: DateTime<Utc>,
        limit: u32,
    ) -> RegistryResult<Vec<UploadAsset>> {
        let sql = format!(
            "SELECT {ASSET_COLUMNS} FROM upload_assets
             WHERE (status = ? AND updated_at < ?) OR status = ?
             ORDER BY updated_at ASC
             LIMIT ?"
        );
        Ok(sqlx::query_as::<_, UploadAsset>(&sql)
            .bind(AssetStatus::Staged)
            .bind(staged_before)
            .bind(AssetStatus::PendingDelete)
            .bind(i64::from(limit))
            .fetch_all(&self.db)
            .await?)
    }

    /// Apply `transition` to the row if its current status allows it.
    ///
    /// Returns `false` when the row is missing or its status is not a legal
    /// predecessor of the target.
    pub async fn transition(&self, id: Uuid, transition: &Transition) -> RegistryResult<bool> {
        let target = transition.target();
        let now = Utc::now();

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE upload_assets SET status = ");
        builder.push_bind(target);
        builder.push(", updated_at = ");
        builder.push_bind(now);

        match transition {
            Transition::Commit => {
                builder.push(", committed_at = ");
                builder.push_bind(now);
                builder.push(", last_delete_error = ''");
            }
            Transition::Delete { note } => {
                builder.push(", deleted_at = ");
                builder.push_bind(now);
                builder.push(", last_delete_error = ");
                builder.push_bind(note.trim().to_string());
            }
            Transition::FailDelete { error } => {
                builder.push(", last_delete_error = ");
                builder.push_bind(error.trim().to_string());
                builder.push(", delete_attempts = delete_attempts + 1");
            }
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" AND status IN (");
        let mut allowed = builder.separated(", ");
        for status in target.predecessors() {
            allowed.push_bind(*status);
        }
        allowed.push_unseparated(")");

        let result = builder.build().execute(&self.db).await?;
        let applied = result.rows_affected() == 1;
        if !applied {
            debug!(%id, %target, "transition not applied");
        }
        Ok(applied)
    }

    /// Bump `updated_at` without changing status, so a row that was looked at
    /// moves to the back of the sweep queue.
    pub async fn touch(&self, id: Uuid) -> RegistryResult<()> {
        sqlx::query("UPDATE upload_assets SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn new_asset(key: &str) -> NewAsset {
        NewAsset {
            module: AssetModule::Products,
            draft_id: "d1".into(),
            object_key: key.into(),
            public_url: format!("https://cdn.example.com/{}", key),
            content_type: "image/png".into(),
            size_bytes: 1024,
            created_by: "user-1".into(),
        }
    }

    async fn registry() -> AssetRegistry {
        AssetRegistry::new(db::memory_pool().await.unwrap())
    }

    #[tokio::test]
    async fn register_creates_staged_row() {
        let registry = registry().await;
        let row = registry.register_staged(&new_asset("dev/products/a.png")).await.unwrap();

        assert_eq!(row.status, AssetStatus::Staged);
        assert_eq!(row.delete_attempts, 0);
        assert_eq!(row.draft_id, "d1");
        assert!(row.committed_at.is_none());
    }

    #[tokio::test]
    async fn repeated_registration_upserts_same_row() {
        let registry = registry().await;
        let first = registry.register_staged(&new_asset("k.png")).await.unwrap();
        let mut again = new_asset("k.png");
        again.size_bytes = 2048;
        let second = registry.register_staged(&again).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.size_bytes, 2048);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM upload_assets")
            .fetch_one(&registry.db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn registration_never_moves_row_back_to_staged() {
        let registry = registry().await;
        let row = registry.register_staged(&new_asset("k.png")).await.unwrap();
        assert!(registry.transition(row.id, &Transition::Commit).await.unwrap());

        let again = registry.register_staged(&new_asset("k.png")).await.unwrap();
        assert_eq!(again.id, row.id);
        assert_eq!(again.status, AssetStatus::Committed);
    }

    #[tokio::test]
    async fn registration_requires_draft_id() {
        let registry = registry().await;
        let mut asset = new_asset("k.png");
        asset.draft_id = "  ".into();
        assert!(matches!(
            registry.register_staged(&asset).await,
            Err(RegistryError::InvalidRegistration(_))
        ));
    }

    #[tokio::test]
    async fn failed_delete_counts_attempts() {
        let registry = registry().await;
        let row = registry.register_staged(&new_asset("k.png")).await.unwrap();
        let fail = Transition::FailDelete {
            error: "timeout".into(),
        };

        assert!(registry.transition(row.id, &fail).await.unwrap());
        assert!(registry.transition(row.id, &fail).await.unwrap());
        let row = registry.get(row.id).await.unwrap().unwrap();
        assert_eq!(row.status, AssetStatus::PendingDelete);
        assert_eq!(row.delete_attempts, 2);
        assert_eq!(row.last_delete_error, "timeout");
    }

    #[tokio::test]
    async fn illegal_transitions_are_refused() {
        let registry = registry().await;
        let row = registry.register_staged(&new_asset("k.png")).await.unwrap();
        let delete = Transition::Delete { note: String::new() };

        assert!(registry.transition(row.id, &delete).await.unwrap());
        assert!(!registry.transition(row.id, &Transition::Commit).await.unwrap());
        assert!(
            !registry
                .transition(row.id, &Transition::FailDelete { error: "x".into() })
                .await
                .unwrap()
        );
        assert!(!registry.transition(row.id, &delete).await.unwrap());

        let row = registry.get(row.id).await.unwrap().unwrap();
        assert_eq!(row.status, AssetStatus::Deleted);
        assert!(row.deleted_at.is_some());
    }

    #[tokio::test]
    async fn untracked_deletes_leave_a_record() {
        let registry = registry().await;
        let url = "https://cdn.example.com/dev/products/x.png";
        registry
            .record_untracked(
                AssetModule::Products,
                "dev/products/x.png",
                url,
                &Transition::Delete { note: String::new() },
            )
            .await
            .unwrap();

        let row = registry.find_by_public_url(url).await.unwrap().unwrap();
        assert_eq!(row.status, AssetStatus::Deleted);
        assert!(row.deleted_at.is_some());

        // A second record for the same object is ignored.
        registry
            .record_untracked(
                AssetModule::Products,
                "dev/products/x.png",
                url,
                &Transition::FailDelete { error: "x".into() },
            )
            .await
            .unwrap();
        let again = registry.find_by_public_url(url).await.unwrap().unwrap();
        assert_eq!(again.id, row.id);
        assert_eq!(again.status, AssetStatus::Deleted);
    }

    #[tokio::test]
    async fn pending_delete_cannot_be_committed() {
        let registry = registry().await;
        let row = registry.register_staged(&new_asset("k.png")).await.unwrap();
        registry
            .transition(row.id, &Transition::FailDelete { error: "x".into() })
            .await
            .unwrap();

        assert!(!registry.transition(row.id, &Transition::Commit).await.unwrap());
    }

    #[tokio::test]
    async fn stale_candidates_pick_old_staged_and_all_pending() {
        let registry = registry().await;
        let old = registry.register_staged(&new_asset("old.png")).await.unwrap();
        let fresh = registry.register_staged(&new_asset("fresh.png")).await.unwrap();
        let pending = registry.register_staged(&new_asset("pending.png")).await.unwrap();
        registry
            .transition(pending.id, &Transition::FailDelete { error: "x".into() })
            .await
            .unwrap();
        sqlx::query("UPDATE upload_assets SET updated_at = ? WHERE id = ?")
            .bind(Utc::now() - chrono::Duration::hours(48))
            .bind(old.id)
            .execute(&registry.db)
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let candidates = registry.stale_candidates(cutoff, 10).await.unwrap();
        let ids: Vec<Uuid> = candidates.iter().map(|a| a.id).collect();

        assert_eq!(ids, vec![old.id, pending.id]);
        assert!(!ids.contains(&fresh.id));
        assert_eq!(registry.stale_candidates(cutoff, 1).await.unwrap().len(), 1);
    }
}
