use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;
use toonify_core::moderation::MAX_UPLOAD_BYTES;

use crate::handlers::uploads;
use crate::state::AppState;

/// Routes mounted at `/uploads`.
///
/// ```text
/// POST   /                -> upload_image
/// ```
///
/// The body limit sits above [`MAX_UPLOAD_BYTES`] so oversized images get
/// the size validation message rather than a bare 413.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(uploads::upload_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES * 2))
}
