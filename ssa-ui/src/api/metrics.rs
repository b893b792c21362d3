//! Metrics and per-post performance

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use super::parse_window;
use crate::error::ApiResult;
use crate::session::SessionId;
use crate::AppState;

/// Query parameters for metric endpoints; dates are `YYYY-MM-DD`, inclusive
#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub post_id: Option<u64>,
}

/// GET /api/metrics
///
/// Full metrics report for the window, or the detail of one post when
/// `post_id` is given.
pub async fn get_metrics(
    State(state): State<AppState>,
    session: SessionId,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Response> {
    let window = parse_window(query.start.as_deref(), query.end.as_deref())?;
    let snapshot = state.snapshot(&session).await?;

    match query.post_id {
        Some(post_id) => {
            let detail = snapshot.calculator().post_detail(&window, post_id)?;
            Ok(Json(detail).into_response())
        }
        None => Ok(Json(snapshot.metrics(&window)).into_response()),
    }
}

/// GET /api/posts
pub async fn get_posts(
    State(state): State<AppState>,
    session: SessionId,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Response> {
    let window = parse_window(query.start.as_deref(), query.end.as_deref())?;
    let snapshot = state.snapshot(&session).await?;
    Ok(Json(snapshot.calculator().post_metrics(&window)).into_response())
}
