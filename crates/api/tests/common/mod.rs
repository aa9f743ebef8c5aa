use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use toonify_api::config::ServerConfig;
use toonify_api::router::build_app_router;
use toonify_api::services::build_services;
use toonify_api::state::AppState;
use toonify_api::ws::WsManager;
use toonify_pipeline::TrackerConfig;

/// Build a test `ServerConfig` with safe defaults: in-memory quota, local
/// simulated backend, no live feed, no moderation service.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        quota_store_dir: None,
        generation_api_url: None,
        progress_ws_url: None,
        moderation_api_url: None,
        tracker: TrackerConfig::default(),
    }
}

/// Build the full application router with the production middleware stack.
pub async fn build_test_app() -> Router {
    let config = test_config();
    let services = build_services(&config).await.unwrap();

    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: services.orchestrator,
        uploads: services.uploads,
        ws_manager: Arc::new(WsManager::new()),
        event_bus: services.event_bus,
    };

    build_app_router(state, &config)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_bytes(
    app: Router,
    uri: &str,
    content_type: Option<&str>,
    bytes: Vec<u8>,
) -> Response<Body> {
    let mut builder = Request::builder().method(Method::POST).uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header("Content-Type", ct);
    }
    app.oneshot(builder.body(Body::from(bytes)).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
