//! Segment overview and paginated subscriber listings

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use ssa_common::metrics::MetricValue;
use ssa_common::model::Availability;
use ssa_common::segments::{Assignment, CleaningReport, GeoReport, Segment, SegmentCount};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::session::SessionId;
use crate::AppState;

/// Segment report without the per-subscriber assignments
#[derive(Debug, Serialize)]
pub struct SegmentsResponse {
    pub reference: NaiveDateTime,
    pub total: usize,
    pub counts: Vec<SegmentCount>,
    pub super_engager_paid_share: MetricValue,
    pub geography: Availability<GeoReport>,
    pub cleaning: CleaningReport,
}

/// GET /api/segments
pub async fn get_segments(
    State(state): State<AppState>,
    session: SessionId,
) -> ApiResult<Json<SegmentsResponse>> {
    let snapshot = state.snapshot(&session).await?;
    let report = snapshot.segments();
    Ok(Json(SegmentsResponse {
        reference: report.reference,
        total: report.total,
        counts: report.counts.clone(),
        super_engager_paid_share: report.super_engager_paid_share,
        geography: report.geography.clone(),
        cleaning: report.cleaning.clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SubscribersQuery {
    /// Segment name; all segments when absent
    pub segment: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
}

fn default_page() -> usize {
    1
}

#[derive(Debug, Serialize)]
pub struct SubscribersResponse {
    pub segment: Option<Segment>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub subscribers: Vec<Assignment>,
}

/// GET /api/segments/subscribers
pub async fn get_segment_subscribers(
    State(state): State<AppState>,
    session: SessionId,
    Query(query): Query<SubscribersQuery>,
) -> ApiResult<Json<SubscribersResponse>> {
    let segment = match query.segment.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => Some(
            Segment::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown segment '{}'", raw)))?,
        ),
    };

    let snapshot = state.snapshot(&session).await?;
    let matching: Vec<&Assignment> = snapshot
        .segments()
        .assignments
        .iter()
        .filter(|a| segment.map_or(true, |s| a.segment == s))
        .collect();

    let pagination = calculate_pagination(matching.len(), query.page);
    Ok(Json(SubscribersResponse {
        segment,
        total: matching.len(),
        page: pagination.page,
        page_size: PAGE_SIZE,
        total_pages: pagination.total_pages,
        subscribers: pagination
            .slice(&matching)
            .iter()
            .map(|a| (*a).clone())
            .collect(),
    }))
}
