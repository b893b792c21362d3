//! Dataset catalog and activation

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use ssa_common::dataset::{DatasetInfo, DatasetSummary};

use crate::error::ApiResult;
use crate::session::SessionId;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DatasetsResponse {
    pub datasets: Vec<DatasetInfo>,
    /// Dataset the requesting session currently sees
    pub active: Option<String>,
}

/// GET /api/datasets
pub async fn list_datasets(
    State(state): State<AppState>,
    session: SessionId,
) -> ApiResult<Json<DatasetsResponse>> {
    let datasets = state.catalog.list()?;
    let active = state.active_dataset(&session).await;
    Ok(Json(DatasetsResponse { datasets, active }))
}

/// POST /api/datasets/:id/activate
///
/// Loads the export and binds it to the session. Fatal load errors leave
/// the session's previous dataset in place.
pub async fn activate_dataset(
    State(state): State<AppState>,
    session: SessionId,
    Path(id): Path<String>,
) -> ApiResult<Json<DatasetSummary>> {
    let snapshot = state.activate(session, &id).await?;
    Ok(Json(snapshot.dataset().summary()))
}

/// GET /api/dataset
pub async fn get_dataset(
    State(state): State<AppState>,
    session: SessionId,
) -> ApiResult<Json<DatasetSummary>> {
    let snapshot = state.snapshot(&session).await?;
    Ok(Json(snapshot.dataset().summary()))
}
