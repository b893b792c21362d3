//! Per-post engagement files under `posts/`
//!
//! Each post contributes `<id>.delivers.csv` and `<id>.opens.csv`, and newer
//! exports may add `<id>.clicks.csv`. The three are joined on
//! (post id, email) into one `DeliveryEvent` per pair.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use super::columns::{ColumnMap, FieldSpec};
use super::reader::CsvTable;
use super::values::{normalize_email, parse_post_id};
use super::FileReport;
use crate::model::DeliveryEvent;
use crate::time::parse_timestamp;
use crate::Result;

pub const FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("post_id", &["post_id"]),
    FieldSpec::required("email", &["email", "email_address"]),
    FieldSpec::required(
        "timestamp",
        &["timestamp", "delivered_at", "opened_at", "clicked_at", "date"],
    ),
];

/// Kind of per-post engagement file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementKind {
    Delivers,
    Opens,
    Clicks,
}

impl EngagementKind {
    /// Classify a `posts/` file name, returning the post id encoded in it
    ///
    /// ```
    /// use ssa_common::normalize::engagement::EngagementKind;
    ///
    /// let (kind, id) = EngagementKind::from_file_name("posts/1795.delivers.csv").unwrap();
    /// assert_eq!(kind, EngagementKind::Delivers);
    /// assert_eq!(id, Some(1795));
    /// assert!(EngagementKind::from_file_name("posts/1795.html").is_none());
    /// ```
    pub fn from_file_name(path: &str) -> Option<(Self, Option<u64>)> {
        let name = path.rsplit('/').next().unwrap_or(path);
        let (stem, kind) = if let Some(stem) = name.strip_suffix(".delivers.csv") {
            (stem, EngagementKind::Delivers)
        } else if let Some(stem) = name.strip_suffix(".opens.csv") {
            (stem, EngagementKind::Opens)
        } else if let Some(stem) = name.strip_suffix(".clicks.csv") {
            (stem, EngagementKind::Clicks)
        } else {
            return None;
        };
        Some((kind, parse_post_id(stem)))
    }
}

/// One parsed engagement row
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementRow {
    pub post_id: u64,
    pub email: String,
    pub timestamp: NaiveDateTime,
}

/// Parse one engagement file.
///
/// The post id column wins over the id in the file name; a file with
/// neither fails with `MissingRequiredColumn`.
pub fn parse_engagement_file(
    table: &CsvTable,
    id_from_name: Option<u64>,
) -> Result<(Vec<EngagementRow>, FileReport)> {
    let mut report = FileReport::new(&table.file, table.records.len() + table.malformed);
    report.rows_skipped = table.malformed;
    if table.is_blank() {
        return Ok((Vec::new(), report));
    }

    let columns = ColumnMap::resolve(&table.file, &table.headers, FIELDS)?;
    if !columns.has("post_id") && id_from_name.is_none() {
        return Err(crate::Error::MissingRequiredColumn {
            file: table.file.clone(),
            column: "post_id".to_string(),
        });
    }

    let mut rows = Vec::with_capacity(table.records.len());
    for record in &table.records {
        let post_id = columns
            .get(record, "post_id")
            .and_then(parse_post_id)
            .or(id_from_name);
        let email = columns.get(record, "email").and_then(normalize_email);
        let timestamp = columns.get(record, "timestamp").and_then(parse_timestamp);
        match (post_id, email, timestamp) {
            (Some(post_id), Some(email), Some(timestamp)) => rows.push(EngagementRow {
                post_id,
                email,
                timestamp,
            }),
            _ => report.rows_skipped += 1,
        }
    }
    report.rows_loaded = rows.len();
    Ok((rows, report))
}

/// Accumulates engagement rows into delivery events
#[derive(Debug, Default)]
pub struct DeliveryJoin {
    events: HashMap<(u64, String), DeliveryEvent>,
    saw_clicks: bool,
}

impl DeliveryJoin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: EngagementKind, rows: Vec<EngagementRow>) {
        if kind == EngagementKind::Clicks {
            self.saw_clicks = true;
        }
        for row in rows {
            let key = (row.post_id, row.email);
            let event = self
                .events
                .entry(key)
                .or_insert_with_key(|(post_id, email)| DeliveryEvent {
                    post_id: *post_id,
                    email: email.clone(),
                    delivered_at: row.timestamp,
                    opened_at: None,
                    clicked: false,
                });

            // An open or click without a delivery row still proves delivery
            event.delivered_at = event.delivered_at.min(row.timestamp);
            match kind {
                EngagementKind::Delivers => {}
                EngagementKind::Opens => {
                    event.opened_at = Some(earliest(event.opened_at, row.timestamp));
                }
                EngagementKind::Clicks => {
                    event.clicked = true;
                    event.opened_at = Some(earliest(event.opened_at, row.timestamp));
                }
            }
        }
    }

    /// True when at least one clicks file was seen, even an empty one
    pub fn has_click_data(&self) -> bool {
        self.saw_clicks
    }

    /// Events ordered by (email, delivery time, post id)
    pub fn finish(self) -> Vec<DeliveryEvent> {
        let mut events: Vec<DeliveryEvent> = self.events.into_values().collect();
        events.sort_by(|a, b| {
            a.email
                .cmp(&b.email)
                .then(a.delivered_at.cmp(&b.delivered_at))
                .then(a.post_id.cmp(&b.post_id))
        });
        events
    }
}

fn earliest(current: Option<NaiveDateTime>, candidate: NaiveDateTime) -> NaiveDateTime {
    current.map(|c| c.min(candidate)).unwrap_or(candidate)
}
