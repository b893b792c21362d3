//! Metrics Calculator
//!
//! Every metric is a pure function of (dataset, window, config). Values
//! serialize as a number, `"undefined"` when the denominator is zero, or
//! `"unavailable"` when the input data is absent from the export.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};

use crate::config::{EngineConfig, Thresholds};
use crate::dataset::Dataset;
use crate::model::{Audience, Post};
use crate::segments::{Segment, SegmentationEngine};
use crate::time::{day_end, day_start};
use crate::{Error, Result};

/// Inclusive date range; an open side extends to the data's edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Window {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Window {
    pub fn all_time() -> Self {
        Self::default()
    }

    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(Error::InvalidInput(format!(
                    "Window start {} is after end {}",
                    s, e
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn is_all_time(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// First instant inside the window
    pub fn start_at(&self) -> Option<NaiveDateTime> {
        self.start.map(day_start)
    }

    /// First instant after the window
    pub fn end_at(&self) -> Option<NaiveDateTime> {
        self.end.map(day_end)
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start_at().map(|s| ts >= s).unwrap_or(true)
            && self.end_at().map(|e| ts < e).unwrap_or(true)
    }
}

/// A metric value, or the reason there is none
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Number(f64),
    /// Zero denominator
    Undefined,
    /// Input data absent from the export
    Unavailable,
}

impl MetricValue {
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            MetricValue::Undefined
        } else {
            MetricValue::Number(numerator / denominator)
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MetricValue::Number(v) => serializer.serialize_f64(*v),
            MetricValue::Undefined => serializer.serialize_str("undefined"),
            MetricValue::Unavailable => serializer.serialize_str("unavailable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Excellent,
    Good,
    Average,
    Poor,
    Unrated,
}

impl Rating {
    /// Classify `value` against benchmark cut points
    ///
    /// ```
    /// use ssa_common::config::Thresholds;
    /// use ssa_common::metrics::{MetricValue, Rating};
    ///
    /// let open_rate = Thresholds::higher(0.45, 0.30, Some(0.20));
    /// assert_eq!(Rating::classify(MetricValue::Number(0.2), &open_rate), Rating::Average);
    /// assert_eq!(Rating::classify(MetricValue::Number(0.19), &open_rate), Rating::Poor);
    /// assert_eq!(Rating::classify(MetricValue::Undefined, &open_rate), Rating::Unrated);
    ///
    /// // Lower-is-better cut points are exclusive
    /// let churn = Thresholds::lower(0.01, 0.03, 0.05);
    /// assert_eq!(Rating::classify(MetricValue::Number(0.01), &churn), Rating::Good);
    /// ```
    pub fn classify(value: MetricValue, t: &Thresholds) -> Self {
        let Some(v) = value.as_f64() else {
            return Rating::Unrated;
        };
        if t.lower_is_better {
            if v < t.excellent {
                Rating::Excellent
            } else if v < t.good {
                Rating::Good
            } else if t.average.map(|a| v < a).unwrap_or(true) {
                Rating::Average
            } else {
                Rating::Poor
            }
        } else if v >= t.excellent {
            Rating::Excellent
        } else if v >= t.good {
            Rating::Good
        } else if t.average.map(|a| v >= a).unwrap_or(true) {
            Rating::Average
        } else {
            Rating::Poor
        }
    }

    pub fn health(&self) -> Health {
        match self {
            Rating::Excellent | Rating::Good => Health::Healthy,
            Rating::Average => Health::NeedsAttention,
            Rating::Poor => Health::Critical,
            Rating::Unrated => Health::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    NeedsAttention,
    Critical,
    Unknown,
}

/// One computed metric with its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub metric: String,
    pub value: MetricValue,
    pub rating: Rating,
    pub health: Health,
    pub window: Window,
    pub numerator: Option<f64>,
    pub denominator: Option<f64>,
}

impl Metric {
    fn ratio(
        name: &str,
        window: &Window,
        numerator: f64,
        denominator: f64,
        thresholds: Option<&Thresholds>,
    ) -> Self {
        let value = MetricValue::ratio(numerator, denominator);
        let rating = thresholds
            .map(|t| Rating::classify(value, t))
            .unwrap_or(Rating::Unrated);
        Self {
            metric: name.to_string(),
            value,
            rating,
            health: rating.health(),
            window: *window,
            numerator: Some(numerator),
            denominator: Some(denominator),
        }
    }

    fn unavailable(name: &str, window: &Window) -> Self {
        Self {
            metric: name.to_string(),
            value: MetricValue::Unavailable,
            rating: Rating::Unrated,
            health: Health::Unknown,
            window: *window,
            numerator: None,
            denominator: None,
        }
    }
}

/// Delivery counts for one post or one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostMetrics {
    pub post_id: u64,
    pub title: String,
    pub published_at: Option<NaiveDateTime>,
    pub audience: Audience,
    pub delivered: u64,
    pub opened: u64,
    /// Absent when the export has no click files
    pub clicked: Option<u64>,
    pub open_rate: MetricValue,
    pub click_rate: MetricValue,
    pub rating: Rating,
    /// open rate x ln(1 + delivered)
    pub engagement_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRef {
    pub post_id: u64,
    pub title: String,
    pub open_rate: f64,
}

/// Performance across posts with enough deliveries to compare
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub significant_posts: usize,
    pub mean_open_rate: MetricValue,
    pub top_performers: Vec<PostRef>,
    pub low_performers: Vec<PostRef>,
}

/// A post opened by payers shortly before their first payment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostConversion {
    pub post_id: u64,
    pub title: String,
    /// Distinct payers who opened the post within the attribution window
    pub conversions: u64,
    pub delivered: u64,
    pub rate: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostReport {
    pub posts: Vec<PostMetrics>,
    pub summary: PerformanceSummary,
    /// Posts with at least one attributed conversion, most conversions first
    pub conversion_posts: Vec<PostConversion>,
}

/// Metrics scoped to one post
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDetail {
    pub post: Post,
    pub open_rate: Metric,
    pub click_rate: Metric,
    pub click_to_open_rate: Metric,
    pub conversion_rate: Metric,
}

/// Everything the overview page shows for one window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub window: Window,
    pub as_of: NaiveDateTime,
    pub open_rate: Metric,
    pub click_rate: Metric,
    pub click_to_open_rate: Metric,
    pub conversion_rate: Metric,
    pub growth_rate: Metric,
    pub growth_rate_long: Metric,
    pub churn_rate: Metric,
    pub paid_churn: Metric,
    pub list_health: Metric,
    pub posts: PostReport,
}

pub struct MetricsCalculator<'a> {
    dataset: &'a Dataset,
    config: &'a EngineConfig,
}

impl<'a> MetricsCalculator<'a> {
    pub fn new(dataset: &'a Dataset, config: &'a EngineConfig) -> Self {
        Self { dataset, config }
    }

    /// Deliveries in `window`, optionally for one post
    pub fn tally(&self, window: &Window, post_id: Option<u64>) -> Tally {
        let mut tally = Tally::default();
        for d in self.dataset.deliveries() {
            if post_id.map(|id| id != d.post_id).unwrap_or(false) || !window.contains(d.delivered_at) {
                continue;
            }
            tally.delivered += 1;
            if d.opened_at.is_some() {
                tally.opened += 1;
            }
            if d.clicked {
                tally.clicked += 1;
            }
        }
        tally
    }

    pub fn open_rate(&self, window: &Window, post_id: Option<u64>) -> Metric {
        let t = self.tally(window, post_id);
        Metric::ratio(
            "open_rate",
            window,
            t.opened as f64,
            t.delivered as f64,
            Some(&self.config.benchmarks.open_rate),
        )
    }

    pub fn click_rate(&self, window: &Window, post_id: Option<u64>) -> Metric {
        let t = self.tally(window, post_id);
        if t.delivered > 0 && !self.dataset.report().clicks_available {
            return Metric::unavailable("click_rate", window);
        }
        Metric::ratio(
            "click_rate",
            window,
            t.clicked as f64,
            t.delivered as f64,
            Some(&self.config.benchmarks.click_rate),
        )
    }

    pub fn click_to_open_rate(&self, window: &Window, post_id: Option<u64>) -> Metric {
        let t = self.tally(window, post_id);
        if t.opened > 0 && !self.dataset.report().clicks_available {
            return Metric::unavailable("click_to_open_rate", window);
        }
        Metric::ratio(
            "click_to_open_rate",
            window,
            t.clicked as f64,
            t.opened as f64,
            Some(&self.config.benchmarks.click_to_open_rate),
        )
    }

    /// Free-to-paid conversion, overall or attributed to one post
    pub fn conversion_rate(&self, window: &Window, post_id: Option<u64>) -> Metric {
        let thresholds = Some(&self.config.benchmarks.conversion_rate);
        if let Some(post_id) = post_id {
            let (converted, delivered) = self.attributed_conversions(window, post_id);
            return Metric::ratio(
                "conversion_rate",
                window,
                converted as f64,
                delivered as f64,
                thresholds,
            );
        }

        let subscribers = self.dataset.subscribers();
        if window.is_all_time() {
            let paid = subscribers.iter().filter(|s| s.is_paid()).count();
            return Metric::ratio(
                "conversion_rate",
                window,
                paid as f64,
                subscribers.len() as f64,
                thresholds,
            );
        }

        let end = window.end_at().unwrap_or_else(|| self.dataset.horizon());
        let start = window.start_at();
        let eligible: Vec<_> = subscribers
            .iter()
            .filter(|s| s.created_at < end)
            .filter(|s| match (s.first_payment_at, start) {
                (Some(paid), Some(start)) => paid >= start,
                _ => true,
            })
            .collect();
        let converted = eligible
            .iter()
            .filter(|s| s.first_payment_at.map(|p| window.contains(p)).unwrap_or(false))
            .count();
        Metric::ratio(
            "conversion_rate",
            window,
            converted as f64,
            eligible.len() as f64,
            thresholds,
        )
    }

    /// (distinct payers who opened the post shortly before paying, deliveries)
    fn attributed_conversions(&self, window: &Window, post_id: u64) -> (u64, u64) {
        let lookback = Duration::days(self.config.metrics.attribution_window_days);
        let mut delivered = 0;
        let mut converted = 0;
        for d in self.dataset.deliveries().iter().filter(|d| d.post_id == post_id) {
            delivered += 1;
            let paid_at = self
                .dataset
                .subscriber(&d.email)
                .and_then(|s| s.first_payment_at)
                .filter(|p| window.contains(*p));
            if let (Some(opened), Some(paid)) = (d.opened_at, paid_at) {
                if opened <= paid && opened >= paid - lookback {
                    converted += 1;
                }
            }
        }
        (converted, delivered)
    }

    /// Period used by growth and churn
    fn period(&self, window: &Window) -> (NaiveDateTime, NaiveDateTime) {
        let end = window.end_at().unwrap_or_else(|| self.dataset.horizon());
        let start = window
            .start_at()
            .unwrap_or_else(|| end - Duration::days(self.config.metrics.growth_period_days));
        (start, end)
    }

    /// Signed up and still subscribed just before `at`
    pub fn subscribers_at(&self, at: NaiveDateTime) -> usize {
        let as_of = self.dataset.as_of();
        self.dataset
            .subscribers()
            .iter()
            .filter(|s| s.exists_before(at) && !s.unsubscribed_before(at, as_of))
            .count()
    }

    pub fn growth_rate(&self, window: &Window) -> Metric {
        let (start, end) = self.period(window);
        self.growth("growth_rate", window, start, end)
    }

    /// Growth over the long trailing period ending with `window`
    pub fn growth_rate_long(&self, window: &Window) -> Metric {
        let end = window.end_at().unwrap_or_else(|| self.dataset.horizon());
        let start = end - Duration::days(self.config.metrics.long_growth_period_days);
        self.growth("growth_rate_long", window, start, end)
    }

    fn growth(&self, name: &str, window: &Window, start: NaiveDateTime, end: NaiveDateTime) -> Metric {
        let before = self.subscribers_at(start) as f64;
        let after = self.subscribers_at(end) as f64;
        Metric::ratio(
            name,
            window,
            after - before,
            before,
            Some(&self.config.benchmarks.growth_rate),
        )
    }

    pub fn churn_rate(&self, window: &Window) -> Metric {
        let (start, end) = self.period(window);
        let unsubscribed = self
            .dataset
            .subscribers()
            .iter()
            .filter(|s| s.unsubscribed_at.map(|u| u >= start && u < end).unwrap_or(false))
            .count();
        Metric::ratio(
            "churn_rate",
            window,
            unsubscribed as f64,
            self.subscribers_at(start) as f64,
            Some(&self.config.benchmarks.churn_rate),
        )
    }

    /// Share of ever-paid subscribers whose subscription has lapsed
    pub fn paid_churn(&self) -> Metric {
        let horizon = self.dataset.horizon();
        let payers: Vec<_> = self
            .dataset
            .subscribers()
            .iter()
            .filter(|s| s.is_paid())
            .collect();
        let churned = payers
            .iter()
            .filter(|s| !s.active_subscription && s.expiry.map(|e| e < horizon).unwrap_or(false))
            .count();
        Metric::ratio(
            "paid_churn",
            &Window::all_time(),
            churned as f64,
            payers.len() as f64,
            Some(&self.config.benchmarks.paid_churn),
        )
    }

    /// Engaged share of the list at the end of `window`
    pub fn list_health_score(&self, window: &Window) -> Metric {
        if !self.dataset.report().engagement_available {
            return Metric::unavailable("list_health", window);
        }
        let end = window.end_at().unwrap_or_else(|| self.dataset.horizon());
        let assignments =
            SegmentationEngine::new(self.dataset, &self.config.segmentation).assign(end);
        let present = assignments
            .iter()
            .filter(|a| a.segment != Segment::Unsubscribed)
            .count();
        let engaged = assignments.iter().filter(|a| a.segment.is_engaged()).count();
        Metric::ratio(
            "list_health",
            window,
            engaged as f64,
            present as f64,
            Some(&self.config.benchmarks.list_health),
        )
    }

    /// Per-post metrics for posts published in `window`
    pub fn post_metrics(&self, window: &Window) -> PostReport {
        let clicks = self.dataset.report().clicks_available;
        let mut tallies: HashMap<u64, Tally> = HashMap::new();
        for d in self.dataset.deliveries() {
            let t = tallies.entry(d.post_id).or_default();
            t.delivered += 1;
            if d.opened_at.is_some() {
                t.opened += 1;
            }
            if d.clicked {
                t.clicked += 1;
            }
        }

        let posts: Vec<PostMetrics> = self
            .dataset
            .posts()
            .iter()
            .filter(|p| {
                window.is_all_time() || p.published_at().map(|at| window.contains(at)).unwrap_or(false)
            })
            .map(|p| {
                let t = tallies.get(&p.post_id).copied().unwrap_or_default();
                let open_rate = MetricValue::ratio(t.opened as f64, t.delivered as f64);
                let click_rate = match (clicks, t.delivered) {
                    (_, 0) => MetricValue::Undefined,
                    (false, _) => MetricValue::Unavailable,
                    (true, delivered) => MetricValue::ratio(t.clicked as f64, delivered as f64),
                };
                PostMetrics {
                    post_id: p.post_id,
                    title: p.title.clone(),
                    published_at: p.published_at(),
                    audience: p.audience,
                    delivered: t.delivered,
                    opened: t.opened,
                    clicked: clicks.then_some(t.clicked),
                    open_rate,
                    click_rate,
                    rating: Rating::classify(open_rate, &self.config.benchmarks.open_rate),
                    engagement_score: open_rate
                        .as_f64()
                        .map(|rate| rate * (1.0 + t.delivered as f64).ln()),
                }
            })
            .collect();

        let summary = self.summarize(&posts);
        let conversion_posts = self.conversion_posts(window, &tallies);
        PostReport {
            posts,
            summary,
            conversion_posts,
        }
    }

    /// Rank posts by distinct payers who opened them shortly before paying
    ///
    /// Payments are counted when they fall inside `window`; the rate divides
    /// by every delivery of the post.
    fn conversion_posts(&self, window: &Window, tallies: &HashMap<u64, Tally>) -> Vec<PostConversion> {
        let lookback = Duration::days(self.config.metrics.attribution_window_days);
        let mut conversions: HashMap<u64, u64> = HashMap::new();
        for payer in self.dataset.subscribers() {
            let Some(paid) = payer.first_payment_at.filter(|p| window.contains(*p)) else {
                continue;
            };
            let mut attributed: Vec<u64> = self
                .dataset
                .deliveries_for(&payer.email)
                .iter()
                .filter(|d| d.opened_at.map(|o| o <= paid && o >= paid - lookback).unwrap_or(false))
                .map(|d| d.post_id)
                .collect();
            attributed.sort_unstable();
            attributed.dedup();
            for post_id in attributed {
                *conversions.entry(post_id).or_default() += 1;
            }
        }

        let mut ranked: Vec<PostConversion> = conversions
            .into_iter()
            .map(|(post_id, conversions)| {
                let delivered = tallies.get(&post_id).map(|t| t.delivered).unwrap_or(0);
                PostConversion {
                    post_id,
                    title: self
                        .dataset
                        .post(post_id)
                        .map(|p| p.title.clone())
                        .unwrap_or_default(),
                    conversions,
                    delivered,
                    rate: MetricValue::ratio(conversions as f64, delivered as f64),
                }
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.conversions
                .cmp(&a.conversions)
                .then_with(|| a.post_id.cmp(&b.post_id))
        });
        ranked
    }

    fn summarize(&self, posts: &[PostMetrics]) -> PerformanceSummary {
        let significant: Vec<PostRef> = posts
            .iter()
            .filter(|p| p.delivered >= self.config.metrics.significant_post_deliveries)
            .filter_map(|p| {
                p.open_rate.as_f64().map(|open_rate| PostRef {
                    post_id: p.post_id,
                    title: p.title.clone(),
                    open_rate,
                })
            })
            .collect();

        let mean = MetricValue::ratio(
            significant.iter().map(|p| p.open_rate).sum(),
            significant.len() as f64,
        );
        let (mut top, mut low) = (Vec::new(), Vec::new());
        if let Some(mean) = mean.as_f64() {
            let low_cut = mean * self.config.metrics.low_performer_factor;
            top = significant.iter().filter(|p| p.open_rate > mean).cloned().collect();
            low = significant.iter().filter(|p| p.open_rate < low_cut).cloned().collect();
        }
        top.sort_by(|a, b| b.open_rate.total_cmp(&a.open_rate));
        low.sort_by(|a, b| a.open_rate.total_cmp(&b.open_rate));

        PerformanceSummary {
            significant_posts: significant.len(),
            mean_open_rate: mean,
            top_performers: top,
            low_performers: low,
        }
    }

    /// Rates and attributed conversion for one post
    pub fn post_detail(&self, window: &Window, post_id: u64) -> Result<PostDetail> {
        let post = self
            .dataset
            .post(post_id)
            .ok_or_else(|| Error::NotFound(format!("Post {}", post_id)))?;
        Ok(PostDetail {
            post: post.clone(),
            open_rate: self.open_rate(window, Some(post_id)),
            click_rate: self.click_rate(window, Some(post_id)),
            click_to_open_rate: self.click_to_open_rate(window, Some(post_id)),
            conversion_rate: self.conversion_rate(window, Some(post_id)),
        })
    }

    pub fn report(&self, window: &Window) -> MetricsReport {
        MetricsReport {
            window: *window,
            as_of: self.dataset.as_of(),
            open_rate: self.open_rate(window, None),
            click_rate: self.click_rate(window, None),
            click_to_open_rate: self.click_to_open_rate(window, None),
            conversion_rate: self.conversion_rate(window, None),
            growth_rate: self.growth_rate(window),
            growth_rate_long: self.growth_rate_long(window),
            churn_rate: self.churn_rate(window),
            paid_churn: self.paid_churn(),
            list_health: self.list_health_score(window),
            posts: self.post_metrics(window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ts, DatasetBuilder};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// 100 subscribers; post 1 reaches the first 50, of whom 10 open
    fn hundred_subscribers() -> Dataset {
        let mut b = DatasetBuilder::new();
        b.post(1, "2024-02-01");
        for i in 0..100 {
            let email = format!("s{:03}@x.com", i);
            b.subscriber(&email, "2024-01-01");
            if i < 10 {
                b.open(1, &email, "2024-02-01 09:00:00", "2024-02-01 12:00:00");
            } else if i < 50 {
                b.deliver(1, &email, "2024-02-01 09:00:00");
            }
        }
        b.build()
    }

    #[test]
    fn test_open_rate_rated_average() {
        let dataset = hundred_subscribers();
        let config = EngineConfig::default();
        let metric = MetricsCalculator::new(&dataset, &config).open_rate(&Window::all_time(), None);

        assert_eq!(metric.value, MetricValue::Number(0.2));
        assert_eq!(metric.rating, Rating::Average);
        assert_eq!(metric.health, Health::NeedsAttention);
        assert_eq!(metric.numerator, Some(10.0));
        assert_eq!(metric.denominator, Some(50.0));
    }

    #[test]
    fn test_open_rate_undefined_without_deliveries_in_window() {
        let dataset = hundred_subscribers();
        let config = EngineConfig::default();
        let window = Window::new(Some(date("2024-03-01")), None).unwrap();
        let metric = MetricsCalculator::new(&dataset, &config).open_rate(&window, None);
        assert_eq!(metric.value, MetricValue::Undefined);
        assert_eq!(metric.health, Health::Unknown);
    }

    #[test]
    fn test_window_end_is_inclusive() {
        let window = Window::new(Some(date("2024-02-01")), Some(date("2024-02-01"))).unwrap();
        assert!(window.contains(ts("2024-02-01 23:59:59")));
        assert!(!window.contains(ts("2024-02-02")));
        assert!(!window.contains(ts("2024-01-31 23:59:59")));
        assert!(Window::new(Some(date("2024-02-02")), Some(date("2024-02-01"))).is_err());
    }

    #[test]
    fn test_click_rate_unavailable_without_click_files() {
        let dataset = hundred_subscribers();
        let config = EngineConfig::default();
        let calc = MetricsCalculator::new(&dataset, &config);
        assert_eq!(calc.click_rate(&Window::all_time(), None).value, MetricValue::Unavailable);
        assert_eq!(
            calc.click_to_open_rate(&Window::all_time(), None).value,
            MetricValue::Unavailable
        );
    }

    #[test]
    fn test_click_rate_zero_when_click_files_present_but_empty() {
        let mut b = DatasetBuilder::new();
        b.subscriber("a@x.com", "2024-01-01")
            .post(1, "2024-02-01")
            .open(1, "a@x.com", "2024-02-01", "2024-02-01 10:00:00")
            .with_clicks();
        let dataset = b.build();
        let config = EngineConfig::default();
        let calc = MetricsCalculator::new(&dataset, &config);

        let click_rate = calc.click_rate(&Window::all_time(), None);
        assert_eq!(click_rate.value, MetricValue::Number(0.0));
        assert_eq!(click_rate.rating, Rating::Poor);
        let posts = calc.post_metrics(&Window::all_time()).posts;
        assert_eq!(posts[0].clicked, Some(0));
    }

    #[test]
    fn test_click_rates_with_click_data() {
        let mut b = DatasetBuilder::new();
        b.subscriber("a@x.com", "2024-01-01")
            .subscriber("b@x.com", "2024-01-01")
            .post(1, "2024-02-01")
            .click(1, "a@x.com", "2024-02-01", "2024-02-01 10:00:00")
            .open(1, "b@x.com", "2024-02-01", "2024-02-01 11:00:00");
        let dataset = b.build();
        let config = EngineConfig::default();
        let calc = MetricsCalculator::new(&dataset, &config);

        assert_eq!(calc.click_rate(&Window::all_time(), None).value, MetricValue::Number(0.5));
        let ctor = calc.click_to_open_rate(&Window::all_time(), Some(1));
        assert_eq!(ctor.value, MetricValue::Number(0.5));
        assert_eq!(ctor.rating, Rating::Excellent);
    }

    #[test]
    fn test_conversion_all_time_and_windowed() {
        let mut b = DatasetBuilder::new();
        b.paid("early@x.com", "2023-01-01", "2023-02-01")
            .paid("march@x.com", "2024-01-01", "2024-03-10")
            .subscriber("free@x.com", "2024-01-01")
            .subscriber("late@x.com", "2024-05-01");
        let dataset = b.build();
        let config = EngineConfig::default();
        let calc = MetricsCalculator::new(&dataset, &config);

        let all = calc.conversion_rate(&Window::all_time(), None);
        assert_eq!(all.value, MetricValue::Number(0.5));

        // early paid before the window, late signed up after it
        let march = Window::new(Some(date("2024-03-01")), Some(date("2024-03-31"))).unwrap();
        let windowed = calc.conversion_rate(&march, None);
        assert_eq!(windowed.numerator, Some(1.0));
        assert_eq!(windowed.denominator, Some(2.0));
    }

    #[test]
    fn test_post_attribution_uses_lookback() {
        let mut b = DatasetBuilder::new();
        b.paid("quick@x.com", "2024-01-01", "2024-02-05")
            .paid("slow@x.com", "2024-01-01", "2024-03-01")
            .subscriber("free@x.com", "2024-01-01")
            .post(1, "2024-02-01")
            .open(1, "quick@x.com", "2024-02-01", "2024-02-01 08:00:00")
            .open(1, "slow@x.com", "2024-02-01", "2024-02-01 08:00:00")
            .open(1, "free@x.com", "2024-02-01", "2024-02-01 08:00:00")
            .deliver(1, "ghost@x.com", "2024-02-01");
        let dataset = b.build();
        let config = EngineConfig::default();
        let metric =
            MetricsCalculator::new(&dataset, &config).conversion_rate(&Window::all_time(), Some(1));

        assert_eq!(metric.numerator, Some(1.0));
        assert_eq!(metric.value, MetricValue::Number(0.25));
    }

    #[test]
    fn test_growth_and_churn_over_window() {
        let mut b = DatasetBuilder::new();
        for i in 0..10 {
            b.subscriber(&format!("base{}@x.com", i), "2024-01-01");
        }
        b.subscriber("new1@x.com", "2024-02-10")
            .subscriber("new2@x.com", "2024-02-11")
            .unsubscribed("left@x.com", "2024-01-01", Some("2024-02-20"));
        let dataset = b.build();
        let config = EngineConfig::default();
        let calc = MetricsCalculator::new(&dataset, &config);
        let feb = Window::new(Some(date("2024-02-01")), Some(date("2024-02-29"))).unwrap();

        // 11 at the start, 12 at the end
        let growth = calc.growth_rate(&feb);
        assert_eq!(growth.numerator, Some(1.0));
        assert_eq!(growth.denominator, Some(11.0));
        assert_eq!(growth.rating, Rating::Excellent);

        let churn = calc.churn_rate(&feb);
        assert_eq!(churn.numerator, Some(1.0));
        assert_eq!(churn.denominator, Some(11.0));
        assert_eq!(churn.rating, Rating::Poor);
    }

    #[test]
    fn test_growth_without_start_uses_trailing_period() {
        let mut b = DatasetBuilder::new();
        b.subscriber("old@x.com", "2023-01-01").subscriber("recent@x.com", "2024-03-01");
        let dataset = b.build();
        let config = EngineConfig::default();
        let growth = MetricsCalculator::new(&dataset, &config).growth_rate(&Window::all_time());
        assert_eq!(growth.value, MetricValue::Number(1.0));
    }

    #[test]
    fn test_paid_churn() {
        let mut b = DatasetBuilder::new();
        b.paid("kept@x.com", "2023-01-01", "2023-02-01")
            .paid("renewing@x.com", "2023-01-01", "2023-02-01")
            .paid("ended@x.com", "2023-01-01", "2023-02-01");
        let ended = b.last();
        ended.active_subscription = false;
        ended.expiry = Some(ts("2023-12-31"));
        b.subscriber("free@x.com", "2024-01-01");

        let dataset = b.build();
        let config = EngineConfig::default();
        let metric = MetricsCalculator::new(&dataset, &config).paid_churn();
        assert_eq!(metric.numerator, Some(1.0));
        assert_eq!(metric.denominator, Some(3.0));
        assert_eq!(metric.rating, Rating::Poor);
        assert_eq!(metric.health, Health::Critical);
    }

    #[test]
    fn test_paid_churn_rated_against_its_own_benchmark() {
        let mut b = DatasetBuilder::new();
        for i in 0..50 {
            b.paid(&format!("p{:02}@x.com", i), "2023-01-01", "2023-02-01");
        }
        let ended = b.last();
        ended.active_subscription = false;
        ended.expiry = Some(ts("2023-12-31"));
        let dataset = b.build();

        // 1 of 50 is 2%
        let config = EngineConfig::default();
        let metric = MetricsCalculator::new(&dataset, &config).paid_churn();
        assert_eq!(metric.value, MetricValue::Number(0.02));
        assert_eq!(metric.rating, Rating::Good);

        let mut strict = EngineConfig::default();
        strict.benchmarks.paid_churn = Thresholds::lower(0.005, 0.01, 0.02);
        let metric = MetricsCalculator::new(&dataset, &strict).paid_churn();
        assert_eq!(metric.rating, Rating::Poor);
    }

    #[test]
    fn test_list_health_unavailable_without_engagement() {
        let mut b = DatasetBuilder::new();
        b.subscriber("a@x.com", "2024-01-01").without_engagement();
        let dataset = b.build();
        let config = EngineConfig::default();
        let metric =
            MetricsCalculator::new(&dataset, &config).list_health_score(&Window::all_time());
        assert_eq!(metric.value, MetricValue::Unavailable);
    }

    #[test]
    fn test_post_summary_flags_top_and_low() {
        let mut b = DatasetBuilder::new();
        b.post(1, "2024-01-01").post(2, "2024-01-08").post(3, "2024-01-15").post(4, "2024-01-22");
        for i in 0..60 {
            let email = format!("r{:02}@x.com", i);
            b.subscriber(&email, "2023-12-01");
            // post 1: 60%, post 2: 30%, post 3: 10%, post 4 only 10 deliveries
            for (post, date, openers) in [(1, "2024-01-01", 36), (2, "2024-01-08", 18), (3, "2024-01-15", 6)] {
                if i < openers {
                    b.open(post, &email, date, date);
                } else {
                    b.deliver(post, &email, date);
                }
            }
            if i < 10 {
                b.open(4, &email, "2024-01-22", "2024-01-22");
            }
        }
        let dataset = b.build();
        let config = EngineConfig::default();
        let report = MetricsCalculator::new(&dataset, &config).post_metrics(&Window::all_time());

        assert_eq!(report.posts.len(), 4);
        assert_eq!(report.posts[3].open_rate, MetricValue::Number(1.0));
        let summary = &report.summary;
        assert_eq!(summary.significant_posts, 3);
        let top: Vec<u64> = summary.top_performers.iter().map(|p| p.post_id).collect();
        let low: Vec<u64> = summary.low_performers.iter().map(|p| p.post_id).collect();
        assert_eq!(top, vec![1]);
        assert_eq!(low, vec![3]);
        assert!(report.posts[0].engagement_score.unwrap() > report.posts[1].engagement_score.unwrap());
    }

    #[test]
    fn test_zero_posts_leaves_post_metrics_undefined() {
        let mut b = DatasetBuilder::new();
        b.subscriber("a@x.com", "2024-01-01");
        let dataset = b.build();
        let config = EngineConfig::default();
        let report = MetricsCalculator::new(&dataset, &config).report(&Window::all_time());

        assert_eq!(report.open_rate.value, MetricValue::Undefined);
        assert_eq!(report.click_rate.value, MetricValue::Undefined);
        assert!(report.posts.posts.is_empty());
        assert_eq!(report.posts.summary.mean_open_rate, MetricValue::Undefined);
    }

    #[test]
    fn test_report_is_idempotent() {
        let dataset = hundred_subscribers();
        let config = EngineConfig::default();
        let calc = MetricsCalculator::new(&dataset, &config);
        let first = serde_json::to_string(&calc.report(&Window::all_time())).unwrap();
        let second = serde_json::to_string(&calc.report(&Window::all_time())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_metric_value_serialization() {
        assert_eq!(serde_json::to_string(&MetricValue::Number(0.25)).unwrap(), "0.25");
        assert_eq!(serde_json::to_string(&MetricValue::Undefined).unwrap(), "\"undefined\"");
        assert_eq!(
            serde_json::to_string(&MetricValue::Unavailable).unwrap(),
            "\"unavailable\""
        );
    }

    #[test]
    fn test_lower_is_better_rating() {
        let churn = EngineConfig::default().benchmarks.churn_rate;
        assert_eq!(Rating::classify(MetricValue::Number(0.005), &churn), Rating::Excellent);
        assert_eq!(Rating::classify(MetricValue::Number(0.04), &churn), Rating::Average);
        assert_eq!(Rating::classify(MetricValue::Number(0.08), &churn), Rating::Poor);
    }

    #[test]
    fn test_lower_is_better_cut_points_are_exclusive() {
        let churn = EngineConfig::default().benchmarks.churn_rate;
        assert_eq!(Rating::classify(MetricValue::Number(0.0099), &churn), Rating::Excellent);
        assert_eq!(Rating::classify(MetricValue::Number(0.01), &churn), Rating::Good);
        assert_eq!(Rating::classify(MetricValue::Number(0.03), &churn), Rating::Average);
        assert_eq!(Rating::classify(MetricValue::Number(0.05), &churn), Rating::Poor);
    }

    #[test]
    fn test_higher_is_better_cut_points_are_inclusive() {
        let open_rate = EngineConfig::default().benchmarks.open_rate;
        assert_eq!(Rating::classify(MetricValue::Number(0.45), &open_rate), Rating::Excellent);
        assert_eq!(Rating::classify(MetricValue::Number(0.30), &open_rate), Rating::Good);
    }

    #[test]
    fn test_conversion_posts_ranked_by_distinct_payers() {
        let mut b = DatasetBuilder::new();
        b.paid("a@x.com", "2024-01-01", "2024-02-06")
            .paid("b@x.com", "2024-01-01", "2024-02-07")
            .paid("late@x.com", "2024-01-01", "2024-03-01")
            .subscriber("free@x.com", "2024-01-01")
            .post(1, "2024-02-01")
            .post(2, "2024-02-04")
            .post(3, "2024-02-10");
        // Both payers read post 2 right before paying; only a@ read post 1
        b.open(1, "a@x.com", "2024-02-01", "2024-02-01 08:00:00")
            .open(2, "a@x.com", "2024-02-04", "2024-02-04 08:00:00")
            .open(2, "b@x.com", "2024-02-04", "2024-02-05 08:00:00")
            .open(2, "free@x.com", "2024-02-04", "2024-02-04 09:00:00")
            // Opened after paying: no credit
            .open(3, "a@x.com", "2024-02-10", "2024-02-10 08:00:00")
            // Paid three weeks after opening: outside the lookback
            .open(1, "late@x.com", "2024-02-01", "2024-02-01 09:00:00")
            .deliver(1, "free@x.com", "2024-02-01");
        let dataset = b.build();
        let config = EngineConfig::default();
        let calc = MetricsCalculator::new(&dataset, &config);
        let ranked = calc.post_metrics(&Window::all_time()).conversion_posts;

        let ids: Vec<u64> = ranked.iter().map(|p| p.post_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(ranked[0].conversions, 2);
        assert_eq!(ranked[0].delivered, 3);
        assert_eq!(ranked[0].title, "Post 2");
        assert_eq!(ranked[1].rate, MetricValue::Number(1.0 / 3.0));

        // Payments outside the window earn nothing
        let march = Window::new(Some(date("2024-03-01")), None).unwrap();
        assert!(calc.post_metrics(&march).conversion_posts.is_empty());
    }

    #[test]
    fn test_long_growth_spans_three_months() {
        let mut b = DatasetBuilder::new();
        for i in 0..4 {
            b.subscriber(&format!("base{}@x.com", i), "2023-10-01");
        }
        b.subscriber("dec@x.com", "2023-12-15")
            .subscriber("jan@x.com", "2024-01-20")
            .subscriber("mar@x.com", "2024-03-10");
        let dataset = b.build();
        let config = EngineConfig::default();
        let report = MetricsCalculator::new(&dataset, &config).report(&Window::all_time());

        // Horizon 2024-03-11: 30 days back starts 2024-02-10, 90 days back 2023-12-12
        assert_eq!(report.growth_rate.numerator, Some(1.0));
        assert_eq!(report.growth_rate.denominator, Some(6.0));
        assert_eq!(report.growth_rate_long.numerator, Some(3.0));
        assert_eq!(report.growth_rate_long.denominator, Some(4.0));
        assert_eq!(report.growth_rate_long.metric, "growth_rate_long");
        assert_eq!(report.growth_rate_long.rating, Rating::Excellent);
    }
}
