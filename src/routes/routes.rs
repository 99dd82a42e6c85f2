//! Route table.
//!
//! ## Structure
//! - **Uploads**
//!   - `POST   /uploads/{module}/sign`: presign a PUT and stage the object
//!   - `POST   /uploads/{module}/discard`: drop a cancelled draft's uploads
//!
//! - **Catalog**
//!   - `POST   /categories`, `GET|PUT|DELETE /categories/{id}`
//!   - `POST   /products`,   `GET|PUT|DELETE /products/{id}`
//!
//! `{module}` is `products` or `categories`.

use crate::{
    handlers::{
        catalog_handlers::{
            create_category, create_product, delete_category, delete_product, get_category,
            get_product, update_category, update_product,
        },
        health_handlers::{healthz, readyz},
        upload_handlers::{discard_draft, sign_upload},
    },
    services::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router; shared state is attached by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // upload lifecycle
        .route("/uploads/{module}/sign", post(sign_upload))
        .route("/uploads/{module}/discard", post(discard_draft))
        // owning entities
        .route("/categories", post(create_category))
        .route(
            "/categories/{id}",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/products", post(create_product))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
}
