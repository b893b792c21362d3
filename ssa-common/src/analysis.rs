//! Acquisition and trend analyses
//!
//! Monthly signups, signup weekdays, acquisition sources, time to paid
//! conversion, monthly open rates and the cumulative subscriber curve.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Duration, NaiveDateTime, Weekday};
use serde::Serialize;

use crate::dataset::Dataset;
use crate::metrics::MetricValue;
use crate::model::{Availability, SubscriberStatus};
use crate::time::{days_between, month_label, month_start, next_month_start};

/// Sources beyond this many are folded into "other"
pub const TOP_SOURCES: usize = 10;
pub const ACTIVE_WINDOW_DAYS: i64 = 30;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySignups {
    pub month: String,
    pub total: usize,
    pub free: usize,
    pub paid: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdayCount {
    pub weekday: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub count: usize,
    pub share: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanCount {
    pub plan: String,
    pub count: usize,
}

/// Days from signup to first payment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionTime {
    pub converted: usize,
    pub mean_days: MetricValue,
    pub median_days: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionReport {
    pub monthly_signups: Vec<MonthlySignups>,
    pub weekday_signups: Vec<WeekdayCount>,
    pub sources: Availability<Vec<SourceCount>>,
    pub plans: Vec<PlanCount>,
    pub conversion_time: ConversionTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyEngagement {
    pub month: String,
    pub deliveries: usize,
    pub opens: usize,
    pub open_rate: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativePoint {
    pub month: String,
    pub signups: usize,
    pub unsubscribes: usize,
    /// Subscribed at the end of the month
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveRatio {
    pub value: MetricValue,
    pub active: usize,
    pub total: usize,
    /// Which input the ratio was computed from
    pub basis: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendsReport {
    pub monthly_engagement: Vec<MonthlyEngagement>,
    pub cumulative_subscribers: Vec<CumulativePoint>,
    pub active_30d: ActiveRatio,
}

/// Month labels from the month of `first` through the month of `last`
fn months_between(first: NaiveDateTime, last: NaiveDateTime) -> Vec<String> {
    let mut months = Vec::new();
    let mut cursor = month_start(first);
    while cursor <= last {
        months.push(month_label(cursor));
        cursor = next_month_start(cursor);
    }
    months
}

fn median(sorted: &[i64]) -> MetricValue {
    match sorted.len() {
        0 => MetricValue::Undefined,
        n if n % 2 == 1 => MetricValue::Number(sorted[n / 2] as f64),
        n => MetricValue::Number((sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0),
    }
}

pub fn acquisition(dataset: &Dataset) -> AcquisitionReport {
    let subscribers = dataset.subscribers();

    let mut by_month: HashMap<String, (usize, usize)> = HashMap::new();
    let mut by_weekday = [0usize; 7];
    let mut sources: HashMap<&str, usize> = HashMap::new();
    let mut plans: HashMap<&str, usize> = HashMap::new();
    let mut days_to_convert = Vec::new();

    for s in subscribers {
        let entry = by_month.entry(month_label(s.created_at)).or_default();
        if s.is_paid() {
            entry.1 += 1;
        } else {
            entry.0 += 1;
        }
        by_weekday[s.created_at.weekday().num_days_from_monday() as usize] += 1;
        if let Some(source) = s.source.as_deref() {
            *sources.entry(source).or_default() += 1;
        }
        if let Some(plan) = s.plan.as_deref() {
            *plans.entry(plan).or_default() += 1;
        }
        if let Some(paid) = s.first_payment_at {
            days_to_convert.push(days_between(s.created_at, paid).max(0));
        }
    }

    let monthly_signups = match (
        subscribers.iter().map(|s| s.created_at).min(),
        subscribers.iter().map(|s| s.created_at).max(),
    ) {
        (Some(first), Some(last)) => months_between(first, last)
            .into_iter()
            .map(|month| {
                let (free, paid) = by_month.get(&month).copied().unwrap_or_default();
                MonthlySignups {
                    month,
                    total: free + paid,
                    free,
                    paid,
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    let weekday_signups = WEEKDAYS
        .iter()
        .zip(by_weekday)
        .map(|(day, count)| WeekdayCount {
            weekday: day.to_string(),
            count,
        })
        .collect();

    let sources = if sources.is_empty() {
        Availability::unavailable("export carries no acquisition source")
    } else {
        let attributed: usize = sources.values().sum();
        let mut ranked: Vec<(&str, usize)> = sources.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let other: usize = ranked.iter().skip(TOP_SOURCES).map(|(_, c)| c).sum();
        let mut data: Vec<SourceCount> = ranked
            .into_iter()
            .take(TOP_SOURCES)
            .map(|(source, count)| SourceCount {
                source: source.to_string(),
                count,
                share: MetricValue::ratio(count as f64, attributed as f64),
            })
            .collect();
        if other > 0 {
            data.push(SourceCount {
                source: "other".to_string(),
                count: other,
                share: MetricValue::ratio(other as f64, attributed as f64),
            });
        }
        Availability::Available { data }
    };

    let mut plans: Vec<PlanCount> = plans
        .into_iter()
        .map(|(plan, count)| PlanCount {
            plan: plan.to_string(),
            count,
        })
        .collect();
    plans.sort_by(|a, b| b.count.cmp(&a.count).then(a.plan.cmp(&b.plan)));

    days_to_convert.sort_unstable();
    let conversion_time = ConversionTime {
        converted: days_to_convert.len(),
        mean_days: MetricValue::ratio(
            days_to_convert.iter().sum::<i64>() as f64,
            days_to_convert.len() as f64,
        ),
        median_days: median(&days_to_convert),
    };

    AcquisitionReport {
        monthly_signups,
        weekday_signups,
        sources,
        plans,
        conversion_time,
    }
}

pub fn trends(dataset: &Dataset) -> TrendsReport {
    let as_of = dataset.as_of();

    let mut engagement: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for d in dataset.deliveries() {
        let entry = engagement.entry(month_label(d.delivered_at)).or_default();
        entry.0 += 1;
        if d.opened_at.is_some() {
            entry.1 += 1;
        }
    }
    let monthly_engagement = engagement
        .into_iter()
        .map(|(month, (deliveries, opens))| MonthlyEngagement {
            month,
            deliveries,
            opens,
            open_rate: MetricValue::ratio(opens as f64, deliveries as f64),
        })
        .collect();

    let mut signups: HashMap<String, usize> = HashMap::new();
    let mut unsubscribes: HashMap<String, usize> = HashMap::new();
    for s in dataset.subscribers() {
        *signups.entry(month_label(s.created_at)).or_default() += 1;
        let left = match (s.status, s.unsubscribed_at) {
            (_, Some(at)) => Some(at),
            (SubscriberStatus::Unsubscribed, None) => Some(as_of),
            (SubscriberStatus::Active, None) => None,
        };
        if let Some(at) = left {
            *unsubscribes.entry(month_label(at)).or_default() += 1;
        }
    }
    let first = dataset.subscribers().iter().map(|s| s.created_at).min();
    let mut total = 0i64;
    let cumulative_subscribers = first
        .map(|first| months_between(first, as_of))
        .unwrap_or_default()
        .into_iter()
        .map(|month| {
            let added = signups.get(&month).copied().unwrap_or(0);
            let removed = unsubscribes.get(&month).copied().unwrap_or(0);
            total += added as i64 - removed as i64;
            CumulativePoint {
                month,
                signups: added,
                unsubscribes: removed,
                total,
            }
        })
        .collect();

    TrendsReport {
        monthly_engagement,
        cumulative_subscribers,
        active_30d: active_ratio(dataset),
    }
}

/// Share of current subscribers who opened anything in the last 30 days
fn active_ratio(dataset: &Dataset) -> ActiveRatio {
    let horizon = dataset.horizon();
    let since = horizon - Duration::days(ACTIVE_WINDOW_DAYS);
    let current: Vec<_> = dataset
        .subscribers()
        .iter()
        .filter(|s| !s.unsubscribed_before(horizon, dataset.as_of()))
        .collect();
    let report = dataset.report();

    let (active, basis) = if report.engagement_available {
        let active = current
            .iter()
            .filter(|s| {
                dataset
                    .deliveries_for(&s.email)
                    .iter()
                    .any(|d| d.opened_at.map(|at| at >= since).unwrap_or(false))
            })
            .count();
        (active, "deliveries")
    } else if report.details_available {
        let active = current
            .iter()
            .filter(|s| {
                s.details
                    .as_ref()
                    .and_then(|d| d.emails_opened_30d)
                    .unwrap_or(0)
                    > 0
            })
            .count();
        (active, "subscriber_details")
    } else {
        return ActiveRatio {
            value: MetricValue::Unavailable,
            active: 0,
            total: current.len(),
            basis: None,
        };
    };

    ActiveRatio {
        value: MetricValue::ratio(active as f64, current.len() as f64),
        active,
        total: current.len(),
        basis: Some(basis.to_string()),
    }
}
