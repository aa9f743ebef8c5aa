//! Handlers for the `/quota` resource.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use toonify_core::quota::QuotaView;
use validator::Validate;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /quota/upgrade`.
#[derive(Debug, Deserialize, Validate)]
pub struct UpgradeQuota {
    #[validate(range(min = 1, max = 10000))]
    pub daily_limit: u32,
    #[validate(range(min = 1, max = 100000))]
    pub monthly_limit: u32,
}

/// GET /api/v1/quota
///
/// Current daily and monthly usage, with any calendar rollover applied.
pub async fn get_quota(State(state): State<AppState>) -> Json<DataResponse<QuotaView>> {
    let view = state.orchestrator.ledger().view().await;
    Json(DataResponse { data: view })
}

/// POST /api/v1/quota/reset-daily
pub async fn reset_daily(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<QuotaView>>> {
    let view = state.orchestrator.ledger().reset_daily_quota().await?;
    Ok(Json(DataResponse { data: view }))
}

/// POST /api/v1/quota/upgrade
///
/// Replace both limits. Limits below current usage are rejected.
pub async fn upgrade(
    State(state): State<AppState>,
    Json(input): Json<UpgradeQuota>,
) -> AppResult<Json<DataResponse<QuotaView>>> {
    input.validate()?;

    let view = state
        .orchestrator
        .ledger()
        .upgrade_quota(input.daily_limit, input.monthly_limit)
        .await?;

    Ok(Json(DataResponse { data: view }))
}
