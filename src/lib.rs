//! Upload-asset lifecycle service: presigned uploads, a persistent asset
//! registry, two-phase draft finalization, reference-counted deletion and a
//! bounded orphan sweep over an S3-compatible bucket.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;

use axum::Router;
use services::AppState;

/// The HTTP application with its state attached.
pub fn app(state: AppState) -> Router {
    routes::routes::routes().with_state(state)
}
