//! Segmentation Engine
//!
//! Classifies every subscriber present at a reference instant into exactly
//! one segment. Precedence, highest first:
//!
//! 1. `unsubscribed` - unsubscribed before the instant
//! 2. `inactive` - long unopened streak, or long idle since the last open
//! 3. `at_risk` - shorter unopened streak or idle period
//! 4. `super_engager` - high trailing open rate over enough deliveries
//! 5. `normal` - everyone else
//!
//! A subscriber with no deliveries never lapses, so without engagement data
//! classification falls back to signup and unsubscribe dates alone.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::{SegmentationConfig, SuperEngagerRule};
use crate::dataset::Dataset;
use crate::metrics::MetricValue;
use crate::model::{Availability, DeliveryEvent, Subscriber};
use crate::time::days_between;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    SuperEngager,
    Normal,
    AtRisk,
    Inactive,
    Unsubscribed,
}

impl Segment {
    pub const ALL: [Segment; 5] = [
        Segment::SuperEngager,
        Segment::Normal,
        Segment::AtRisk,
        Segment::Inactive,
        Segment::Unsubscribed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::SuperEngager => "super_engager",
            Segment::Normal => "normal",
            Segment::AtRisk => "at_risk",
            Segment::Inactive => "inactive",
            Segment::Unsubscribed => "unsubscribed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Segment::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    /// Counted as healthy by the list health score
    pub fn is_engaged(&self) -> bool {
        matches!(self, Segment::SuperEngager | Segment::Normal)
    }
}

/// Engagement history of one subscriber before a cutoff
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Activity {
    pub deliveries: usize,
    pub opens: usize,
    pub trailing_deliveries: usize,
    pub trailing_opens: usize,
    /// Most recent deliveries in a row that were not opened
    pub consecutive_missed: usize,
    pub last_open: Option<NaiveDateTime>,
    /// Days since the last open (or signup) while deliveries went unopened
    pub idle_days: Option<i64>,
}

impl Activity {
    pub fn trailing_open_rate(&self) -> Option<f64> {
        (self.trailing_deliveries > 0)
            .then(|| self.trailing_opens as f64 / self.trailing_deliveries as f64)
    }

    pub fn open_rate(&self) -> Option<f64> {
        (self.deliveries > 0).then(|| self.opens as f64 / self.deliveries as f64)
    }
}

/// Summarize `deliveries` (oldest first) as seen just before `end`
pub fn activity(
    subscriber: &Subscriber,
    deliveries: &[DeliveryEvent],
    end: NaiveDateTime,
    trailing_posts: usize,
) -> Activity {
    let seen: Vec<&DeliveryEvent> = deliveries.iter().filter(|d| d.delivered_at < end).collect();
    let opened = |d: &DeliveryEvent| d.opened_before(end);

    let last_open = seen
        .iter()
        .filter_map(|d| d.opened_at.filter(|at| *at < end))
        .max();
    let consecutive_missed = seen.iter().rev().take_while(|d| !opened(d)).count();
    let trailing = &seen[seen.len().saturating_sub(trailing_posts)..];

    Activity {
        deliveries: seen.len(),
        opens: seen.iter().filter(|d| opened(d)).count(),
        trailing_deliveries: trailing.len(),
        trailing_opens: trailing.iter().filter(|d| opened(d)).count(),
        consecutive_missed,
        last_open,
        idle_days: (consecutive_missed > 0)
            .then(|| days_between(last_open.unwrap_or(subscriber.created_at), end)),
    }
}

/// [`activity`] for one subscriber at a series of ascending cutoffs
///
/// Each delivery is visited once across the whole series; only the trailing
/// window is rescanned per cutoff.
#[derive(Debug, Clone)]
pub struct ActivityCursor<'d> {
    created_at: NaiveDateTime,
    deliveries: &'d [DeliveryEvent],
    trailing_posts: usize,
    seen: usize,
    opens: usize,
    last_opened: Option<usize>,
    last_open: Option<NaiveDateTime>,
    /// Seen deliveries whose open lies at or after the current cutoff
    pending: Vec<usize>,
}

impl<'d> ActivityCursor<'d> {
    pub fn new(subscriber: &Subscriber, deliveries: &'d [DeliveryEvent], trailing_posts: usize) -> Self {
        Self {
            created_at: subscriber.created_at,
            deliveries,
            trailing_posts,
            seen: 0,
            opens: 0,
            last_opened: None,
            last_open: None,
            pending: Vec::new(),
        }
    }

    fn record_open(&mut self, index: usize, at: NaiveDateTime) {
        self.opens += 1;
        self.last_opened = self.last_opened.max(Some(index));
        self.last_open = self.last_open.max(Some(at));
    }

    /// Activity just before `end`; cutoffs must not decrease between calls
    pub fn advance(&mut self, end: NaiveDateTime) -> Activity {
        let deliveries = self.deliveries;
        let mut i = 0;
        while i < self.pending.len() {
            let index = self.pending[i];
            match deliveries[index].opened_at {
                Some(at) if at < end => {
                    self.pending.swap_remove(i);
                    self.record_open(index, at);
                }
                _ => i += 1,
            }
        }
        while self.seen < deliveries.len() && deliveries[self.seen].delivered_at < end {
            let index = self.seen;
            self.seen += 1;
            match deliveries[index].opened_at {
                Some(at) if at < end => self.record_open(index, at),
                Some(_) => self.pending.push(index),
                None => {}
            }
        }

        let consecutive_missed = match self.last_opened {
            Some(index) => self.seen - index - 1,
            None => self.seen,
        };
        let trailing = &deliveries[self.seen.saturating_sub(self.trailing_posts)..self.seen];
        Activity {
            deliveries: self.seen,
            opens: self.opens,
            trailing_deliveries: trailing.len(),
            trailing_opens: trailing.iter().filter(|d| d.opened_before(end)).count(),
            consecutive_missed,
            last_open: self.last_open,
            idle_days: (consecutive_missed > 0)
                .then(|| days_between(self.last_open.unwrap_or(self.created_at), end)),
        }
    }
}

/// Segment of one subscriber at a reference instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub email: String,
    pub segment: Segment,
    pub created_at: NaiveDateTime,
    pub is_paid: bool,
    pub country: Option<String>,
    pub trailing_open_rate: Option<f64>,
    #[serde(flatten)]
    pub activity: Activity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentCount {
    pub segment: Segment,
    pub count: usize,
    pub share: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryBucket {
    pub country: String,
    pub subscribers: usize,
    pub super_engagers: usize,
    pub paid: usize,
    pub share: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionBucket {
    pub country: String,
    pub region: String,
    pub subscribers: usize,
}

/// Subscribers per country and per country/region, unsubscribed excluded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoReport {
    pub countries: Vec<CountryBucket>,
    pub regions: Vec<RegionBucket>,
    /// Subscribers whose country is unknown
    pub unknown: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningCandidate {
    pub email: String,
    pub deliveries: usize,
    pub opens: usize,
    pub last_open: Option<NaiveDateTime>,
}

/// List-cleaning candidates; the three lists are disjoint
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    /// Enough deliveries, not a single open
    pub never_opened: Vec<CleaningCandidate>,
    /// Inactive with a weak open history
    pub lapsed: Vec<CleaningCandidate>,
    /// At-risk or inactive, but historically engaged
    pub reengagement: Vec<CleaningCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentReport {
    pub reference: NaiveDateTime,
    pub total: usize,
    pub counts: Vec<SegmentCount>,
    pub super_engager_paid_share: MetricValue,
    pub geography: Availability<GeoReport>,
    pub cleaning: CleaningReport,
    pub assignments: Vec<Assignment>,
}

impl SegmentReport {
    pub fn count(&self, segment: Segment) -> usize {
        self.counts
            .iter()
            .find(|c| c.segment == segment)
            .map(|c| c.count)
            .unwrap_or(0)
    }
}

/// Every subscriber's segment at successive cutoffs, see [`SegmentationEngine::series`]
pub struct SegmentSeries<'a> {
    engine: SegmentationEngine<'a>,
    cursors: Vec<ActivityCursor<'a>>,
    segments: Vec<Option<Segment>>,
    candidates: Vec<(usize, f64)>,
}

impl<'a> SegmentSeries<'a> {
    /// Segments at `end`, indexed like `Dataset::subscribers`; `None` for
    /// subscribers not signed up yet. Cutoffs must not decrease.
    pub fn advance(&mut self, end: NaiveDateTime) -> &[Option<Segment>] {
        self.candidates.clear();
        let dataset: &'a Dataset = self.engine.dataset;
        let subscribers = dataset.subscribers();
        for (i, subscriber) in subscribers.iter().enumerate() {
            if !subscriber.exists_before(end) {
                self.segments[i] = None;
                continue;
            }
            let activity = self.cursors[i].advance(end);
            let (segment, candidate) = self.engine.base_segment(subscriber, &activity, end);
            if let Some(rate) = candidate {
                self.candidates.push((i, rate));
            }
            self.segments[i] = Some(segment);
        }
        for i in self.engine.promoted(&mut self.candidates) {
            self.segments[i] = Some(Segment::SuperEngager);
        }
        &self.segments
    }
}

pub struct SegmentationEngine<'a> {
    dataset: &'a Dataset,
    config: &'a SegmentationConfig,
}

impl<'a> SegmentationEngine<'a> {
    pub fn new(dataset: &'a Dataset, config: &'a SegmentationConfig) -> Self {
        Self { dataset, config }
    }

    fn lapse(&self, a: &Activity) -> Option<Segment> {
        let idle = a.idle_days.unwrap_or(0);
        let missed = a.consecutive_missed;
        if missed >= self.config.inactive_missed_posts
            || (missed > 0 && idle >= self.config.inactive_days)
        {
            Some(Segment::Inactive)
        } else if missed >= self.config.at_risk_missed_posts
            || (missed > 0 && idle >= self.config.at_risk_days)
        {
            Some(Segment::AtRisk)
        } else {
            None
        }
    }

    /// Segment ignoring super engager promotion, plus the trailing open rate
    /// when the subscriber is a promotion candidate
    fn base_segment(
        &self,
        subscriber: &Subscriber,
        activity: &Activity,
        end: NaiveDateTime,
    ) -> (Segment, Option<f64>) {
        if subscriber.unsubscribed_before(end, self.dataset.as_of()) {
            return (Segment::Unsubscribed, None);
        }
        if let Some(lapsed) = self.lapse(activity) {
            return (lapsed, None);
        }
        let candidate = (activity.trailing_deliveries >= self.config.min_deliveries)
            .then(|| activity.trailing_open_rate())
            .flatten();
        (Segment::Normal, candidate)
    }

    /// Positions of the candidates promoted to super engager
    ///
    /// `candidates` holds (position, trailing open rate) in email order.
    fn promoted(&self, candidates: &mut [(usize, f64)]) -> Vec<usize> {
        match self.config.super_engager {
            SuperEngagerRule::OpenRate { threshold } => candidates
                .iter()
                .filter(|(_, rate)| *rate >= threshold)
                .map(|(i, _)| *i)
                .collect(),
            SuperEngagerRule::TopPercentile { fraction } => {
                let take = (fraction * candidates.len() as f64).ceil() as usize;
                // Stable sort keeps email order among equal rates
                candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
                candidates
                    .iter()
                    .filter(|(_, rate)| *rate > 0.0)
                    .take(take)
                    .map(|(i, _)| *i)
                    .collect()
            }
        }
    }

    /// Classify everyone who signed up before `end`, ordered by email
    pub fn assign(&self, end: NaiveDateTime) -> Vec<Assignment> {
        let mut assignments = Vec::new();
        let mut candidates: Vec<(usize, f64)> = Vec::new();

        for subscriber in self.dataset.subscribers() {
            if !subscriber.exists_before(end) {
                continue;
            }
            let activity = activity(
                subscriber,
                self.dataset.deliveries_for(&subscriber.email),
                end,
                self.config.trailing_posts,
            );
            let (segment, candidate) = self.base_segment(subscriber, &activity, end);
            if let Some(rate) = candidate {
                candidates.push((assignments.len(), rate));
            }

            assignments.push(Assignment {
                email: subscriber.email.clone(),
                segment,
                created_at: subscriber.created_at,
                is_paid: subscriber.is_paid(),
                country: subscriber.country().map(str::to_string),
                trailing_open_rate: activity.trailing_open_rate(),
                activity,
            });
        }

        for i in self.promoted(&mut candidates) {
            assignments[i].segment = Segment::SuperEngager;
        }
        assignments
    }

    /// Segments at ascending cutoffs without recomputing history each time
    pub fn series(&self) -> SegmentSeries<'a> {
        let dataset: &'a Dataset = self.dataset;
        let cursors = dataset
            .subscribers()
            .iter()
            .map(|s| {
                ActivityCursor::new(s, dataset.deliveries_for(&s.email), self.config.trailing_posts)
            })
            .collect();
        SegmentSeries {
            engine: SegmentationEngine::new(dataset, self.config),
            cursors,
            segments: vec![None; dataset.subscribers().len()],
            candidates: Vec::new(),
        }
    }

    /// Full segmentation report at `end`
    pub fn report(&self, end: NaiveDateTime) -> SegmentReport {
        let assignments = self.assign(end);
        let total = assignments.len();

        let mut counts: BTreeMap<Segment, usize> = Segment::ALL.iter().map(|s| (*s, 0)).collect();
        for a in &assignments {
            *counts.entry(a.segment).or_default() += 1;
        }
        let counts = counts
            .into_iter()
            .map(|(segment, count)| SegmentCount {
                segment,
                count,
                share: MetricValue::ratio(count as f64, total as f64),
            })
            .collect();

        let supers: Vec<&Assignment> = assignments
            .iter()
            .filter(|a| a.segment == Segment::SuperEngager)
            .collect();
        let super_engager_paid_share = MetricValue::ratio(
            supers.iter().filter(|a| a.is_paid).count() as f64,
            supers.len() as f64,
        );

        SegmentReport {
            reference: end,
            total,
            counts,
            super_engager_paid_share,
            geography: self.geography(&assignments),
            cleaning: self.cleaning(&assignments, end),
            assignments,
        }
    }

    fn geography(&self, assignments: &[Assignment]) -> Availability<GeoReport> {
        if !self.dataset.report().details_available {
            return Availability::unavailable("subscriber_details.csv not present in export");
        }
        let present: Vec<&Assignment> = assignments
            .iter()
            .filter(|a| a.segment != Segment::Unsubscribed)
            .collect();
        if present.iter().all(|a| a.country.is_none()) {
            return Availability::unavailable("no country data in subscriber details");
        }

        let mut countries: BTreeMap<&str, (usize, usize, usize)> = BTreeMap::new();
        let mut regions: BTreeMap<(&str, &str), usize> = BTreeMap::new();
        let mut unknown = 0;
        for a in &present {
            let Some(country) = a.country.as_deref() else {
                unknown += 1;
                continue;
            };
            let entry = countries.entry(country).or_default();
            entry.0 += 1;
            if a.segment == Segment::SuperEngager {
                entry.1 += 1;
            }
            if a.is_paid {
                entry.2 += 1;
            }
            let region = self
                .dataset
                .subscriber(&a.email)
                .and_then(|s| s.details.as_ref())
                .and_then(|d| d.region.as_deref());
            if let Some(region) = region {
                *regions.entry((country, region)).or_default() += 1;
            }
        }

        let known = present.len() - unknown;
        let mut countries: Vec<CountryBucket> = countries
            .into_iter()
            .map(|(country, (subscribers, super_engagers, paid))| CountryBucket {
                country: country.to_string(),
                subscribers,
                super_engagers,
                paid,
                share: MetricValue::ratio(subscribers as f64, known as f64),
            })
            .collect();
        countries.sort_by(|a, b| b.subscribers.cmp(&a.subscribers));

        let mut regions: Vec<RegionBucket> = regions
            .into_iter()
            .map(|((country, region), subscribers)| RegionBucket {
                country: country.to_string(),
                region: region.to_string(),
                subscribers,
            })
            .collect();
        regions.sort_by(|a, b| b.subscribers.cmp(&a.subscribers));

        Availability::Available {
            data: GeoReport {
                countries,
                regions,
                unknown,
            },
        }
    }

    /// Any recorded click, share or comment in the details file
    fn interacts_off_email(&self, email: &str) -> bool {
        self.dataset
            .subscriber(email)
            .and_then(|s| s.details.as_ref())
            .map(|d| {
                [d.links_clicked, d.shares, d.comments]
                    .iter()
                    .any(|n| n.unwrap_or(0) > 0)
            })
            .unwrap_or(false)
    }

    fn cleaning(&self, assignments: &[Assignment], end: NaiveDateTime) -> CleaningReport {
        let mut report = CleaningReport::default();
        for a in assignments {
            if a.segment == Segment::Unsubscribed
                || days_between(a.created_at, end) < self.config.new_subscriber_days
                || a.activity.deliveries < self.config.cleaning_min_deliveries
            {
                continue;
            }
            let candidate = CleaningCandidate {
                email: a.email.clone(),
                deliveries: a.activity.deliveries,
                opens: a.activity.opens,
                last_open: a.activity.last_open,
            };
            let historical = a.activity.open_rate().unwrap_or(0.0);
            let lapsing = matches!(a.segment, Segment::AtRisk | Segment::Inactive);
            if a.activity.opens == 0 {
                report.never_opened.push(candidate);
            } else if a.is_paid {
                // Payers are never suggested for removal or win-back campaigns
                continue;
            } else if lapsing && historical >= self.config.reengagement_open_rate {
                report.reengagement.push(candidate);
            } else if a.segment == Segment::Inactive && !self.interacts_off_email(&a.email) {
                report.lapsed.push(candidate);
            }
        }
        report
    }
}
