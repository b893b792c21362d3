//! Engagement Flow Aggregator
//!
//! Counts how subscribers move between engagement states from one time
//! bucket to the next. Every subscriber present at the end of the earlier
//! bucket is counted exactly once per adjacent pair, so each pair's counts
//! sum to that bucket's population.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDateTime};
use serde::Serialize;
use tracing::debug;

use crate::config::{Bucketing, FlowConfig, SegmentationConfig};
use crate::dataset::Dataset;
use crate::segments::{Assignment, Segment, SegmentationEngine};
use crate::time::{day_start, month_label, month_start, next_month_start, week_start};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    New,
    Active,
    AtRisk,
    Inactive,
    Unsubscribed,
}

impl FlowState {
    /// State of a subscriber in the bucket starting at `bucket_start`
    pub fn of(assignment: &Assignment, bucket_start: NaiveDateTime) -> Self {
        Self::classify(assignment.segment, assignment.created_at, bucket_start)
    }

    pub fn classify(segment: Segment, created_at: NaiveDateTime, bucket_start: NaiveDateTime) -> Self {
        match segment {
            Segment::Unsubscribed => FlowState::Unsubscribed,
            _ if created_at >= bucket_start => FlowState::New,
            Segment::SuperEngager | Segment::Normal => FlowState::Active,
            Segment::AtRisk => FlowState::AtRisk,
            Segment::Inactive => FlowState::Inactive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowOptions {
    pub bucketing: Bucketing,
    pub max_buckets: Option<usize>,
}

impl From<&FlowConfig> for FlowOptions {
    fn from(config: &FlowConfig) -> Self {
        Self {
            bucketing: config.bucketing,
            max_buckets: config.max_buckets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Subscribers signed up before the bucket ends
    pub present: usize,
    pub states: BTreeMap<FlowState, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub from: FlowState,
    pub to: FlowState,
    pub bucket: String,
    pub next_bucket: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAvailability {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowReport {
    pub availability: FlowAvailability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub bucketing: Bucketing,
    pub buckets: Vec<Bucket>,
    pub transitions: Vec<Transition>,
}

impl FlowReport {
    fn unavailable(bucketing: Bucketing, reason: &str) -> Self {
        Self {
            availability: FlowAvailability::Unavailable,
            reason: Some(reason.to_string()),
            bucketing,
            buckets: Vec::new(),
            transitions: Vec::new(),
        }
    }
}

fn bucket_label(bucketing: Bucketing, start: NaiveDateTime) -> String {
    match bucketing {
        Bucketing::Month => month_label(start),
        Bucketing::Week => {
            let week = start.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Bucketing::Days { .. } => start.date().to_string(),
    }
}

/// Consecutive bucket bounds covering `first..=last`
pub fn bucket_bounds(
    bucketing: Bucketing,
    first: NaiveDateTime,
    last: NaiveDateTime,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let mut start = match bucketing {
        Bucketing::Month => month_start(first),
        Bucketing::Week => week_start(first),
        Bucketing::Days { .. } => day_start(first.date()),
    };
    let mut bounds = Vec::new();
    while start <= last {
        let end = match bucketing {
            Bucketing::Month => next_month_start(start),
            Bucketing::Week => start + Duration::days(7),
            Bucketing::Days { days } => start + Duration::days(i64::from(days.max(1))),
        };
        bounds.push((start, end));
        start = end;
    }
    bounds
}

/// Upper bound on buckets in one report; older buckets are dropped first
pub const MAX_BUCKETS: usize = 520;

/// Transition counts between adjacent buckets, from the first signup
/// through the dataset's `as_of`
pub fn engagement_flow(
    dataset: &Dataset,
    config: &SegmentationConfig,
    options: &FlowOptions,
) -> FlowReport {
    let Some(first) = dataset.subscribers().iter().map(|s| s.created_at).min() else {
        return FlowReport::unavailable(options.bucketing, "no subscribers");
    };
    let mut bounds = bucket_bounds(options.bucketing, first, dataset.as_of());
    let max = options.max_buckets.unwrap_or(MAX_BUCKETS).min(MAX_BUCKETS);
    bounds.drain(..bounds.len().saturating_sub(max));
    if bounds.len() < 2 {
        return FlowReport::unavailable(options.bucketing, "fewer than two time buckets");
    }
    debug!("Computing engagement flow over {} buckets", bounds.len());

    let subscribers = dataset.subscribers();
    let horizon = dataset.horizon();
    let mut series = SegmentationEngine::new(dataset, config).series();
    let mut buckets: Vec<Bucket> = Vec::with_capacity(bounds.len());
    let mut transitions = Vec::new();
    let mut previous: Vec<Option<FlowState>> = Vec::new();

    for (start, end) in &bounds {
        let states: Vec<Option<FlowState>> = series
            .advance((*end).min(horizon))
            .iter()
            .zip(subscribers)
            .map(|(segment, s)| segment.map(|seg| FlowState::classify(seg, s.created_at, *start)))
            .collect();

        let mut counts = BTreeMap::new();
        for state in states.iter().flatten() {
            *counts.entry(*state).or_insert(0) += 1;
        }
        let bucket = Bucket {
            label: bucket_label(options.bucketing, *start),
            start: *start,
            end: *end,
            present: states.iter().flatten().count(),
            states: counts,
        };

        if let Some(last) = buckets.last() {
            let mut pairs: BTreeMap<(FlowState, FlowState), usize> = BTreeMap::new();
            // Presence only grows, so everyone here is present next bucket
            for (from, to) in previous.iter().zip(&states) {
                if let (Some(from), Some(to)) = (from, to) {
                    *pairs.entry((*from, *to)).or_insert(0) += 1;
                }
            }
            transitions.extend(pairs.into_iter().map(|((from, to), count)| Transition {
                from,
                to,
                bucket: last.label.clone(),
                next_bucket: bucket.label.clone(),
                count,
            }));
        }
        buckets.push(bucket);
        previous = states;
    }

    FlowReport {
        availability: FlowAvailability::Available,
        reason: None,
        bucketing: options.bucketing,
        buckets,
        transitions,
    }
}
