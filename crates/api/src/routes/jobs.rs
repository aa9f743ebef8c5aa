use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                -> submit_job
/// GET    /current         -> get_current
/// POST   /current/cancel  -> cancel_current
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::submit_job))
        .route("/current", get(jobs::get_current))
        .route("/current/cancel", post(jobs::cancel_current))
}
