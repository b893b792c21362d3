//! HTTP API handlers for ssa-ui

pub mod analysis;
pub mod datasets;
pub mod flow;
pub mod health;
pub mod metrics;
pub mod segments;
pub mod ui;

pub use analysis::{get_acquisition, get_trends};
pub use datasets::{activate_dataset, get_dataset, list_datasets};
pub use flow::get_flow;
pub use health::health_routes;
pub use metrics::{get_metrics, get_posts};
pub use segments::{get_segment_subscribers, get_segments};
pub use ui::{serve_app_js, serve_index};

use chrono::NaiveDate;
use ssa_common::metrics::Window;

use crate::error::{ApiError, ApiResult};

/// Parse an optional `YYYY-MM-DD` query parameter; blank means absent
pub(crate) fn parse_date(name: &str, raw: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("{} must be YYYY-MM-DD, got '{}'", name, value))),
    }
}

/// Window from `start`/`end` query parameters
pub(crate) fn parse_window(start: Option<&str>, end: Option<&str>) -> ApiResult<Window> {
    let start = parse_date("start", start)?;
    let end = parse_date("end", end)?;
    Ok(Window::new(start, end)?)
}
