use axum::routing::{get, post};
use axum::Router;

use crate::handlers::quota;
use crate::state::AppState;

/// Routes mounted at `/quota`.
///
/// ```text
/// GET    /                -> get_quota
/// POST   /reset-daily     -> reset_daily
/// POST   /upgrade         -> upgrade
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(quota::get_quota))
        .route("/reset-daily", post(quota::reset_daily))
        .route("/upgrade", post(quota::upgrade))
}
