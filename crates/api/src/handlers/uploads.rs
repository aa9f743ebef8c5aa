//! Handler for image uploads.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/uploads
///
/// Raw image bytes with their `Content-Type`. Returns 201 with the
/// `image_reference` to pass to `POST /jobs`.
pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Content-Type header".to_string()))?;

    let upload = state.uploads.screen(content_type, &body).await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: upload })))
}
