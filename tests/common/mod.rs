#![allow(dead_code)]

use asset_keeper::{
    config::{SlugConfig, SweepConfig},
    db,
    models::upload_asset::{AssetModule, AssetStatus},
    services::{
        AppState, ServiceSettings,
        upload_signer::{SignUploadRequest, SignedUpload, SignerSettings},
    },
    storage::{MemoryStorage, PublicUrlScheme},
};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

pub const BASE_URL: &str = "https://cdn.example.com";
pub const USER: &str = "user-1";

pub struct Harness {
    pub db: SqlitePool,
    pub state: AppState,
    pub storage: MemoryStorage,
}

impl Harness {
    pub async fn new() -> Self {
        let db = db::memory_pool().await.unwrap();
        let storage = MemoryStorage::new();
        let state = AppState::new(
            db.clone(),
            Arc::new(storage.clone()),
            ServiceSettings {
                urls: PublicUrlScheme::new(BASE_URL),
                signer: SignerSettings::default(),
                sweep: SweepConfig::default(),
                slugs: SlugConfig::default(),
            },
        );
        Self { db, state, storage }
    }

    /// Sign an upload and simulate the client's PUT landing in the bucket.
    pub async fn upload(
        &self,
        module: AssetModule,
        draft_id: &str,
        filename: &str,
    ) -> SignedUpload {
        let signed = self
            .state
            .signer
            .sign_upload(
                &SignUploadRequest {
                    module,
                    filename: filename.into(),
                    content_type: "image/png".into(),
                    size: 100_000,
                    draft_id: draft_id.into(),
                },
                USER,
            )
            .await
            .unwrap();
        self.storage.put_object(&signed.object_key, vec![0u8; 16]);
        signed
    }

    pub async fn status(&self, public_url: &str) -> AssetStatus {
        self.state
            .registry
            .find_by_public_url(public_url)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    /// Push a row's last update `hours` into the past.
    pub async fn age(&self, public_url: &str, hours: i64) {
        sqlx::query("UPDATE upload_assets SET updated_at = ? WHERE public_url = ?")
            .bind(Utc::now() - Duration::hours(hours))
            .bind(public_url)
            .execute(&self.db)
            .await
            .unwrap();
    }
}
