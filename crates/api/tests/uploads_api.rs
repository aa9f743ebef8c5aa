//! Integration tests for `POST /api/v1/uploads`.

mod common;

use axum::http::StatusCode;
use common::{body_json, post_bytes};

fn png() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0; 32]);
    bytes
}

#[tokio::test]
async fn png_upload_is_accepted() {
    let app = common::build_test_app().await;
    let response = post_bytes(app, "/api/v1/uploads", Some("image/png"), png()).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["format"], "png");
    assert!(json["data"]["image_reference"]
        .as_str()
        .unwrap()
        .starts_with("upload://"));
}

#[tokio::test]
async fn non_image_content_type_is_rejected() {
    let app = common::build_test_app().await;
    let response = post_bytes(app, "/api/v1/uploads", Some("text/plain"), png()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn missing_content_type_is_a_bad_request() {
    let app = common::build_test_app().await;
    let response = post_bytes(app, "/api/v1/uploads", None, png()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn oversized_upload_reports_the_limit() {
    let app = common::build_test_app().await;
    let mut bytes = png();
    bytes.resize(6 * 1024 * 1024, 0);
    let response = post_bytes(app, "/api/v1/uploads", Some("image/png"), bytes).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("5 MB"));
}
