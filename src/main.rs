use anyhow::{Context, Result};
use asset_keeper::{
    config::{AppConfig, RunMode},
    db,
    services::{AppState, ServiceSettings},
    storage::S3Storage,
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;
    tracing::info!("Starting asset-keeper with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db = db::connect(&cfg.database_url)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))?;

    // --- Handle migration mode ---
    if mode == RunMode::Migrate {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Initialize core services ---
    let storage = Arc::new(S3Storage::connect(&cfg.storage).await);
    let state = AppState::new(
        db,
        storage,
        ServiceSettings {
            urls: cfg.storage.public_url_scheme(),
            signer: (&cfg.storage).into(),
            sweep: cfg.sweep,
            slugs: cfg.slugs,
        },
    );

    // --- One-shot sweep mode ---
    if mode == RunMode::Sweep {
        let summary = state
            .sweep
            .run_default()
            .await
            .context("orphan sweep failed")?;
        println!("{}", serde_json::to_string(&summary)?);
        return Ok(());
    }

    // --- Start server ---
    let app = asset_keeper::app(state);
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
