pub mod asset_registry;
pub mod catalog_repo;
pub mod catalog_service;
pub mod deleter;
pub mod draft_assets;
pub mod orphan_sweep;
pub mod slug_allocator;
pub mod upload_signer;

use crate::{
    config::{SlugConfig, SweepConfig},
    storage::{ObjectStorage, PublicUrlScheme},
};
use asset_registry::AssetRegistry;
use catalog_repo::CatalogRepo;
use catalog_service::CatalogService;
use deleter::ReferenceCountedDeleter;
use draft_assets::AssetLifecycle;
use orphan_sweep::OrphanSweep;
use slug_allocator::SlugAllocator;
use sqlx::SqlitePool;
use std::sync::Arc;
use upload_signer::{SignerSettings, UploadSigner};

/// Shared state handed to every handler. One instance per process; clones
/// share the pool and the storage client.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub registry: AssetRegistry,
    pub signer: UploadSigner,
    pub lifecycle: AssetLifecycle,
    pub sweep: OrphanSweep,
    pub catalog: CatalogService,
}

/// Everything besides the pool and the storage client needed to wire up the
/// services.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub urls: PublicUrlScheme,
    pub signer: SignerSettings,
    pub sweep: SweepConfig,
    pub slugs: SlugConfig,
}

impl AppState {
    pub fn new(db: SqlitePool, storage: Arc<dyn ObjectStorage>, settings: ServiceSettings) -> Self {
        let registry = AssetRegistry::new(db.clone());
        let repo = CatalogRepo::new(db.clone());
        let deleter = ReferenceCountedDeleter::new(
            registry.clone(),
            repo.clone(),
            storage.clone(),
            settings.urls.clone(),
        );
        let lifecycle = AssetLifecycle::new(registry.clone(), deleter.clone());
        let sweep = OrphanSweep::new(registry.clone(), deleter, settings.sweep);
        let signer = UploadSigner::new(
            storage,
            registry.clone(),
            settings.urls.clone(),
            settings.signer,
        );
        let catalog = CatalogService::new(
            repo.clone(),
            SlugAllocator::new(repo, settings.slugs),
            lifecycle.clone(),
            settings.urls,
        );

        Self {
            db,
            registry,
            signer,
            lifecycle,
            sweep,
            catalog,
        }
    }
}
