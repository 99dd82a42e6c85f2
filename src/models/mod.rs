//! Core data models for the upload asset lifecycle.
//!
//! `UploadAsset` is the registry record this service owns; `Product` and
//! `Category` are the owning entities whose image fields hold references.
//! All of them map to SQLite rows via `sqlx::FromRow` and serialize as JSON
//! via `serde`.

pub mod catalog;
pub mod upload_asset;
