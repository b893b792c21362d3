//! Acquisition and trend analyses

use axum::{extract::State, Json};
use ssa_common::analysis::{AcquisitionReport, TrendsReport};

use crate::error::ApiResult;
use crate::session::SessionId;
use crate::AppState;

/// GET /api/acquisition
pub async fn get_acquisition(
    State(state): State<AppState>,
    session: SessionId,
) -> ApiResult<Json<AcquisitionReport>> {
    let snapshot = state.snapshot(&session).await?;
    Ok(Json(snapshot.acquisition().clone()))
}

/// GET /api/trends
pub async fn get_trends(
    State(state): State<AppState>,
    session: SessionId,
) -> ApiResult<Json<TrendsReport>> {
    let snapshot = state.snapshot(&session).await?;
    Ok(Json(snapshot.trends().clone()))
}
