//! Handlers for the `/jobs` resource.
//!
//! Only one job is tracked at a time, so the resource is addressed as
//! `current` rather than by id.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use toonify_core::error::CoreError;
use toonify_core::generation::GenerationRequest;
use toonify_core::job::JobSnapshot;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CancelOutcome {
    pub cancelled: bool,
}

/// POST /api/v1/jobs
///
/// Submit a generation job and start tracking it, stopping any job that
/// was being tracked. Returns 201 with the job's first snapshot; later
/// snapshots are pushed over `/ws`.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<GenerationRequest>,
) -> AppResult<impl IntoResponse> {
    let mut subscription = state.orchestrator.submit_and_track(&input).await?;

    let snapshot = subscription.next().await.ok_or_else(|| {
        CoreError::Internal(format!(
            "Job {} ended before its first snapshot",
            subscription.job_id()
        ))
    })?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: snapshot })))
}

/// GET /api/v1/jobs/current
///
/// Latest snapshot of the most recent job, `null` before the first submit.
pub async fn get_current(State(state): State<AppState>) -> Json<DataResponse<Option<JobSnapshot>>> {
    Json(DataResponse {
        data: state.orchestrator.current_snapshot().await,
    })
}

/// POST /api/v1/jobs/current/cancel
///
/// Stop tracking the running job. Consumed quota is not refunded.
pub async fn cancel_current(State(state): State<AppState>) -> Json<DataResponse<CancelOutcome>> {
    let cancelled = state.orchestrator.cancel().await;
    Json(DataResponse {
        data: CancelOutcome { cancelled },
    })
}
