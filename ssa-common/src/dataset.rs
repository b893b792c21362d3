//! Datasets, snapshots and the on-disk catalog
//!
//! A [`Dataset`] is immutable once built. A [`Snapshot`] pairs one dataset
//! with the engine configuration and caches derived results; switching
//! datasets means dropping the snapshot, which drops its caches with it.

use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{self, AcquisitionReport, TrendsReport};
use crate::config::{EngineConfig, DATASETS_DIR};
use crate::flow::{self, FlowOptions, FlowReport};
use crate::metrics::{MetricsCalculator, MetricsReport, Window};
use crate::model::{DeliveryEvent, Post, Subscriber};
use crate::normalize::{self, DirSource, FileReport};
use crate::segments::{SegmentReport, SegmentationEngine};
use crate::time::day_end;
use crate::{Error, Result};

/// Non-fatal problem recorded while loading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub code: String,
    pub message: String,
}

impl From<&Error> for Notice {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// What the normalizer read, skipped and could not find
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub files: Vec<FileReport>,
    pub notices: Vec<Notice>,
    /// Optional inputs that were absent or unreadable
    pub unavailable: Vec<String>,
    pub details_available: bool,
    pub engagement_available: bool,
    pub clicks_available: bool,
}

/// One loaded export
#[derive(Debug, Clone)]
pub struct Dataset {
    id: String,
    name: String,
    subscribers: Vec<Subscriber>,
    posts: Vec<Post>,
    /// Ordered by (email, delivered_at, post_id)
    deliveries: Vec<DeliveryEvent>,
    as_of: NaiveDateTime,
    report: LoadReport,
    subscriber_index: HashMap<String, usize>,
    post_index: HashMap<u64, usize>,
    delivery_ranges: HashMap<String, Range<usize>>,
}

impl Dataset {
    pub fn new(
        id: &str,
        name: &str,
        mut subscribers: Vec<Subscriber>,
        mut posts: Vec<Post>,
        mut deliveries: Vec<DeliveryEvent>,
        report: LoadReport,
    ) -> Self {
        subscribers.sort_by(|a, b| a.email.cmp(&b.email));
        posts.sort_by_key(|p| (p.published_at(), p.post_id));
        deliveries.sort_by(|a, b| {
            a.email
                .cmp(&b.email)
                .then(a.delivered_at.cmp(&b.delivered_at))
                .then(a.post_id.cmp(&b.post_id))
        });

        let subscriber_index = subscribers
            .iter()
            .enumerate()
            .map(|(i, s)| (s.email.clone(), i))
            .collect();
        let post_index = posts.iter().enumerate().map(|(i, p)| (p.post_id, i)).collect();

        let mut delivery_ranges: HashMap<String, Range<usize>> = HashMap::new();
        let mut start = 0;
        for i in 1..=deliveries.len() {
            if i == deliveries.len() || deliveries[i].email != deliveries[start].email {
                delivery_ranges.insert(deliveries[start].email.clone(), start..i);
                start = i;
            }
        }

        let as_of = latest_timestamp(&subscribers, &posts, &deliveries);
        Self {
            id: id.to_string(),
            name: name.to_string(),
            subscribers,
            posts,
            deliveries,
            as_of,
            report,
            subscriber_index,
            post_index,
            delivery_ranges,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribers(&self) -> &[Subscriber] {
        &self.subscribers
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn deliveries(&self) -> &[DeliveryEvent] {
        &self.deliveries
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Latest timestamp observed anywhere in the data
    pub fn as_of(&self) -> NaiveDateTime {
        self.as_of
    }

    /// Exclusive end of the observed period (midnight after `as_of`)
    pub fn horizon(&self) -> NaiveDateTime {
        day_end(self.as_of.date())
    }

    pub fn subscriber(&self, email: &str) -> Option<&Subscriber> {
        self.subscriber_index.get(email).map(|&i| &self.subscribers[i])
    }

    pub fn post(&self, post_id: u64) -> Option<&Post> {
        self.post_index.get(&post_id).map(|&i| &self.posts[i])
    }

    /// Deliveries to one subscriber, oldest first
    pub fn deliveries_for(&self, email: &str) -> &[DeliveryEvent] {
        self.delivery_ranges
            .get(email)
            .map(|r| &self.deliveries[r.clone()])
            .unwrap_or(&[])
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            as_of: self.as_of,
            subscribers: self.subscribers.len(),
            posts: self.posts.len(),
            deliveries: self.deliveries.len(),
            opens: self.deliveries.iter().filter(|d| d.opened_at.is_some()).count(),
            report: self.report.clone(),
        }
    }
}

fn latest_timestamp(
    subscribers: &[Subscriber],
    posts: &[Post],
    deliveries: &[DeliveryEvent],
) -> NaiveDateTime {
    let from_subscribers = subscribers.iter().flat_map(|s| {
        [Some(s.created_at), s.unsubscribed_at, s.first_payment_at]
            .into_iter()
            .flatten()
    });
    let from_posts = posts.iter().filter_map(|p| p.published_at());
    let from_deliveries = deliveries
        .iter()
        .flat_map(|d| [Some(d.delivered_at), d.opened_at].into_iter().flatten());

    from_subscribers
        .chain(from_posts)
        .chain(from_deliveries)
        .max()
        .unwrap_or_default()
}

/// Headline numbers and load report for the dashboard header
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub id: String,
    pub name: String,
    pub as_of: NaiveDateTime,
    pub subscribers: usize,
    pub posts: usize,
    pub deliveries: usize,
    pub opens: usize,
    pub report: LoadReport,
}

/// A dataset bound to a configuration, with lazily computed results
#[derive(Debug)]
pub struct Snapshot {
    dataset: Arc<Dataset>,
    config: Arc<EngineConfig>,
    segments: OnceCell<SegmentReport>,
    metrics: OnceCell<MetricsReport>,
    flow: OnceCell<FlowReport>,
    acquisition: OnceCell<AcquisitionReport>,
    trends: OnceCell<TrendsReport>,
}

impl Snapshot {
    pub fn new(dataset: Arc<Dataset>, config: Arc<EngineConfig>) -> Self {
        Self {
            dataset,
            config,
            segments: OnceCell::new(),
            metrics: OnceCell::new(),
            flow: OnceCell::new(),
            acquisition: OnceCell::new(),
            trends: OnceCell::new(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn calculator(&self) -> MetricsCalculator<'_> {
        MetricsCalculator::new(&self.dataset, &self.config)
    }

    /// Segmentation at the end of the observed period
    pub fn segments(&self) -> &SegmentReport {
        self.segments.get_or_init(|| {
            SegmentationEngine::new(&self.dataset, &self.config.segmentation)
                .report(self.dataset.horizon())
        })
    }

    /// Metrics report for `window`; the all-time report is cached
    pub fn metrics(&self, window: &Window) -> MetricsReport {
        if window.is_all_time() {
            self.metrics
                .get_or_init(|| self.calculator().report(window))
                .clone()
        } else {
            self.calculator().report(window)
        }
    }

    /// Engagement flow; the configured default bucketing is cached
    pub fn flow(&self, options: &FlowOptions) -> FlowReport {
        let default = FlowOptions::from(&self.config.flow);
        if *options == default {
            self.flow
                .get_or_init(|| flow::engagement_flow(&self.dataset, &self.config.segmentation, &default))
                .clone()
        } else {
            flow::engagement_flow(&self.dataset, &self.config.segmentation, options)
        }
    }

    pub fn acquisition(&self) -> &AcquisitionReport {
        self.acquisition
            .get_or_init(|| analysis::acquisition(&self.dataset))
    }

    pub fn trends(&self) -> &TrendsReport {
        self.trends.get_or_init(|| analysis::trends(&self.dataset))
    }
}

/// Optional `manifest.json` written next to an extracted export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub name: Option<String>,
    pub created_at: Option<String>,
    pub source_filename: Option<String>,
}

/// Catalog entry for one extracted dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub id: String,
    pub name: String,
    pub created_at: Option<String>,
    pub source_filename: Option<String>,
}

/// Read-only view of `<root>/datasets/`
#[derive(Debug, Clone)]
pub struct DatasetCatalog {
    datasets_dir: PathBuf,
}

impl DatasetCatalog {
    pub fn new(root_folder: &Path) -> Self {
        Self {
            datasets_dir: root_folder.join(DATASETS_DIR),
        }
    }

    pub fn datasets_dir(&self) -> &Path {
        &self.datasets_dir
    }

    /// Dataset ids are directory names: ASCII alphanumerics, `-`, `_`, `.`
    pub fn validate_id(id: &str) -> Result<()> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!("Invalid dataset id: {:?}", id)))
        }
    }

    pub fn list(&self) -> Result<Vec<DatasetInfo>> {
        if !self.datasets_dir.is_dir() {
            debug!("No datasets directory at {}", self.datasets_dir.display());
            return Ok(Vec::new());
        }
        let mut infos = Vec::new();
        for entry in std::fs::read_dir(&self.datasets_dir)? {
            let entry = entry?;
            let id = entry.file_name().to_string_lossy().to_string();
            if !entry.path().is_dir() || Self::validate_id(&id).is_err() {
                continue;
            }
            infos.push(self.info(&id, &entry.path()));
        }
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(infos)
    }

    fn info(&self, id: &str, dir: &Path) -> DatasetInfo {
        let manifest = read_manifest(dir);
        DatasetInfo {
            id: id.to_string(),
            name: manifest.name.unwrap_or_else(|| id.to_string()),
            created_at: manifest.created_at,
            source_filename: manifest.source_filename,
        }
    }

    /// Load and normalize dataset `id`
    pub fn load(&self, id: &str) -> Result<Dataset> {
        Self::validate_id(id)?;
        let dir = self.datasets_dir.join(id);
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("Dataset '{}'", id)));
        }
        let info = self.info(id, &dir);
        info!("Loading dataset '{}' from {}", id, dir.display());
        let source = DirSource::open(&dir)?;
        let dataset = normalize::load_dataset(&source, id, &info.name)?;
        info!(
            "Dataset '{}' ready: {} subscribers, {} posts, {} deliveries",
            id,
            dataset.subscribers().len(),
            dataset.posts().len(),
            dataset.deliveries().len()
        );
        Ok(dataset)
    }
}

fn read_manifest(dir: &Path) -> Manifest {
    let path = dir.join("manifest.json");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Manifest::default();
    };
    serde_json::from_str(&text).unwrap_or_else(|e| {
        warn!("Ignoring unreadable {}: {}", path.display(), e);
        Manifest::default()
    })
}
