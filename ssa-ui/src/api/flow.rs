//! Engagement flow between time buckets

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use ssa_common::config::Bucketing;
use ssa_common::flow::{FlowOptions, FlowReport, MAX_BUCKETS};

use crate::error::{ApiError, ApiResult};
use crate::session::SessionId;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FlowQuery {
    /// `month`, `week` or `days`; the configured bucketing when absent
    pub bucket: Option<String>,
    /// Bucket length for `bucket=days`
    pub days: Option<u32>,
    /// Keep only the most recent buckets, at most `MAX_BUCKETS`
    pub max_buckets: Option<usize>,
}

impl FlowQuery {
    fn options(&self, defaults: FlowOptions) -> Result<FlowOptions, ApiError> {
        let bucketing = match self.bucket.as_deref() {
            None | Some("") => defaults.bucketing,
            Some("month") => Bucketing::Month,
            Some("week") => Bucketing::Week,
            Some("days") => match self.days {
                Some(days) if days > 0 => Bucketing::Days { days },
                _ => return Err(ApiError::BadRequest("bucket=days requires days > 0".to_string())),
            },
            Some(other) => {
                return Err(ApiError::BadRequest(format!("unknown bucket '{}'", other)))
            }
        };
        let max_buckets = match self.max_buckets {
            Some(0) | Some(1) => {
                return Err(ApiError::BadRequest("max_buckets must be at least 2".to_string()))
            }
            Some(max) => Some(max.min(MAX_BUCKETS)),
            None => defaults.max_buckets,
        };
        Ok(FlowOptions {
            bucketing,
            max_buckets,
        })
    }
}

/// GET /api/flow
pub async fn get_flow(
    State(state): State<AppState>,
    session: SessionId,
    Query(query): Query<FlowQuery>,
) -> ApiResult<Json<FlowReport>> {
    let options = query.options(FlowOptions::from(&state.config.flow))?;
    let snapshot = state.snapshot(&session).await?;
    let report = tokio::task::spawn_blocking(move || snapshot.flow(&options))
        .await
        .map_err(|e| ApiError::Internal(format!("flow task failed: {}", e)))?;
    Ok(Json(report))
}
