mod common;

use asset_keeper::models::upload_asset::AssetStatus;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use common::{Harness, USER};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

fn post(uri: &str, principal: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(principal) = principal {
        builder = builder.header("x-principal-id", principal);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(res: Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn app(h: &Harness) -> Router {
    asset_keeper::app(h.state.clone())
}

fn sign_body() -> Value {
    json!({
        "filename": "photo.webp",
        "contentType": "image/webp",
        "size": 2048,
        "draftId": "d1"
    })
}

#[tokio::test]
async fn sign_returns_presigned_put_and_stages_row() {
    let h = Harness::new().await;
    let res = app(&h)
        .oneshot(post("/uploads/products/sign", Some(USER), sign_body()))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    let public_url = body["publicUrl"].as_str().unwrap().to_string();
    assert!(body["uploadUrl"].as_str().unwrap().starts_with("memory://dev/products/"));
    assert!(body["objectKey"].as_str().unwrap().ends_with(".webp"));
    assert_eq!(body["headers"]["Content-Type"], "image/webp");
    assert_eq!(h.status(&public_url).await, AssetStatus::Staged);
}

#[tokio::test]
async fn sign_rejects_bad_input_with_json_error() {
    let h = Harness::new().await;

    let res = app(&h)
        .oneshot(post("/uploads/avatars/sign", Some(USER), sign_body()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json_body(res).await;
    assert_eq!(body["status"], 400);
    assert_eq!(body["error"], "invalid upload module `avatars`");

    let mut oversized = sign_body();
    oversized["size"] = json!(50 * 1024 * 1024);
    let res = app(&h)
        .oneshot(post("/uploads/categories/sign", Some(USER), oversized))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "Image size exceeds limit (5MB)");
}

#[tokio::test]
async fn sign_requires_principal() {
    let h = Harness::new().await;
    let res = app(&h)
        .oneshot(post("/uploads/products/sign", None, sign_body()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn discard_reports_summary() {
    let h = Harness::new().await;
    let signed = h
        .upload(asset_keeper::models::upload_asset::AssetModule::Products, "d1", "a.png")
        .await;

    let res = app(&h)
        .oneshot(post("/uploads/products/discard", Some(USER), json!({ "draftId": "d1" })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        json_body(res).await,
        json!({ "total": 1, "deleted": 1, "kept": 0, "pendingDelete": 0 })
    );
    assert_eq!(h.status(&signed.public_url).await, AssetStatus::Deleted);
}

#[tokio::test]
async fn category_write_finalizes_its_draft() {
    let h = Harness::new().await;
    let router = app(&h);

    let res = router
        .clone()
        .oneshot(post("/uploads/categories/sign", Some(USER), sign_body()))
        .await
        .unwrap();
    let card = json_body(res).await["publicUrl"].as_str().unwrap().to_string();

    let res = router
        .clone()
        .oneshot(post(
            "/categories",
            Some(USER),
            json!({ "name": "Towing Gear", "cardImage": card, "uploadDraftId": "d1" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let category = json_body(res).await;
    assert_eq!(category["slug"], "towing-gear");
    assert_eq!(h.status(&card).await, AssetStatus::Committed);

    let res = router
        .oneshot(post("/categories", Some(USER), json!({ "name": "  " })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "Missing required fields (name)");
}

#[tokio::test]
async fn health_endpoints_answer() {
    let h = Harness::new().await;
    let res = app(&h)
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app(&h)
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["checks"]["sqlite"]["ok"], true);
}
