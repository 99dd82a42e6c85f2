//! Registry record for every object that was ever issued a write URL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Storage and reference namespace an asset belongs to.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AssetModule {
    Products,
    Categories,
}

impl AssetModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetModule::Products => "products",
            AssetModule::Categories => "categories",
        }
    }
}

impl fmt::Display for AssetModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid upload module `{0}`")]
pub struct InvalidModule(pub String);

impl FromStr for AssetModule {
    type Err = InvalidModule;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "products" => Ok(AssetModule::Products),
            "categories" => Ok(AssetModule::Categories),
            other => Err(InvalidModule(other.to_string())),
        }
    }
}

/// Lifecycle state of an upload asset.
///
/// Transitions only move forward along
/// `staged < committed < pending_delete < deleted` (plus the
/// `pending_delete` retry self-loop). Nothing re-enters `Staged` and
/// `Deleted` is terminal.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AssetStatus {
    Staged,
    Committed,
    PendingDelete,
    Deleted,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Staged => "staged",
            AssetStatus::Committed => "committed",
            AssetStatus::PendingDelete => "pending_delete",
            AssetStatus::Deleted => "deleted",
        }
    }

    /// States from which `self` may be entered.
    pub fn predecessors(&self) -> &'static [AssetStatus] {
        match self {
            AssetStatus::Staged => &[],
            AssetStatus::Committed => &[AssetStatus::Staged],
            AssetStatus::PendingDelete => &[
                AssetStatus::Staged,
                AssetStatus::Committed,
                AssetStatus::PendingDelete,
            ],
            AssetStatus::Deleted => &[
                AssetStatus::Staged,
                AssetStatus::Committed,
                AssetStatus::PendingDelete,
            ],
        }
    }

    pub fn can_transition_to(&self, next: AssetStatus) -> bool {
        next.predecessors().contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AssetStatus::Deleted)
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row per physical object issued a presigned write URL.
///
/// Rows are never hard-deleted; `Deleted` keeps the record for audit.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadAsset {
    pub id: Uuid,

    pub module: AssetModule,

    /// Client edit session that uploaded the object.
    pub draft_id: String,

    /// Storage backend key, unique for all time.
    pub object_key: String,

    /// Public URL derived from `object_key`, unique for all time.
    pub public_url: String,

    pub content_type: String,

    pub size_bytes: i64,

    /// Identity of the uploading principal.
    pub created_by: String,

    pub status: AssetStatus,

    pub delete_attempts: i64,

    pub last_delete_error: String,

    pub committed_at: Option<DateTime<Utc>>,

    pub deleted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
