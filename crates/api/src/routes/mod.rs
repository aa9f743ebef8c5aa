pub mod health;
pub mod jobs;
pub mod quota;
pub mod uploads;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /quota                     usage view (GET)
/// /quota/reset-daily         clear today's usage (POST)
/// /quota/upgrade             replace limits (POST)
///
/// /uploads                   screen an image upload (POST)
///
/// /jobs                      submit and track (POST)
/// /jobs/current              latest snapshot (GET)
/// /jobs/current/cancel       stop tracking (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/quota", quota::router())
        .nest("/uploads", uploads::router())
        .nest("/jobs", jobs::router())
}

/// Root-level WebSocket endpoint.
pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws::ws_handler))
}
