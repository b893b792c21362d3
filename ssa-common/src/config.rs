//! Configuration loading and root folder resolution
//!
//! Every engine threshold lives in [`EngineConfig`] and is injected into the
//! engine calls. The TOML file (`ssa.toml`) carries the engine sections next
//! to the server settings:
//!
//! ```toml
//! root_folder = "/home/me/ssa"
//! port = 5780
//!
//! [logging]
//! level = "debug"
//!
//! [segmentation]
//! at_risk_missed_posts = 4
//!
//! [segmentation.super_engager]
//! rule = "top_percentile"
//! fraction = 0.1
//!
//! [benchmarks.open_rate]
//! excellent = 0.5
//! good = 0.35
//! average = 0.2
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 5780;
pub const ROOT_FOLDER_ENV: &str = "SSA_ROOT_FOLDER";
pub const CONFIG_ENV: &str = "SSA_CONFIG";
pub const CONFIG_FILE_NAME: &str = "ssa.toml";
pub const DATASETS_DIR: &str = "datasets";

/// All engine thresholds
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub segmentation: SegmentationConfig,
    pub benchmarks: BenchmarkConfig,
    pub metrics: MetricsConfig,
    pub flow: FlowConfig,
}

impl EngineConfig {
    /// Reject threshold combinations the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        let s = &self.segmentation;
        if s.trailing_posts == 0 {
            return Err(Error::Config("segmentation.trailing_posts must be at least 1".into()));
        }
        if s.at_risk_missed_posts == 0 || s.at_risk_missed_posts >= s.inactive_missed_posts {
            return Err(Error::Config(
                "segmentation.at_risk_missed_posts must be between 1 and inactive_missed_posts".into(),
            ));
        }
        if s.at_risk_days <= 0 || s.at_risk_days >= s.inactive_days {
            return Err(Error::Config(
                "segmentation.at_risk_days must be positive and below inactive_days".into(),
            ));
        }
        let fraction = match s.super_engager {
            SuperEngagerRule::OpenRate { threshold } => threshold,
            SuperEngagerRule::TopPercentile { fraction } => fraction,
        };
        if !(0.0..=1.0).contains(&fraction) || !(0.0..=1.0).contains(&s.reengagement_open_rate) {
            return Err(Error::Config("segmentation rates must lie in [0, 1]".into()));
        }
        if self.metrics.growth_period_days <= 0
            || self.metrics.long_growth_period_days <= 0
            || self.metrics.attribution_window_days < 0
        {
            return Err(Error::Config("metrics periods must be positive".into()));
        }
        Ok(())
    }
}

/// How super engagers are picked among qualifying subscribers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SuperEngagerRule {
    /// Trailing open rate at or above `threshold`
    OpenRate { threshold: f64 },
    /// Highest trailing open rates, the top `fraction` of qualifying subscribers
    TopPercentile { fraction: f64 },
}

impl Default for SuperEngagerRule {
    fn default() -> Self {
        SuperEngagerRule::OpenRate { threshold: 0.8 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub trailing_posts: usize,
    pub min_deliveries: usize,
    pub super_engager: SuperEngagerRule,
    pub at_risk_missed_posts: usize,
    pub inactive_missed_posts: usize,
    pub at_risk_days: i64,
    pub inactive_days: i64,
    pub new_subscriber_days: i64,
    pub cleaning_min_deliveries: usize,
    pub reengagement_open_rate: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            trailing_posts: 10,
            min_deliveries: 5,
            super_engager: SuperEngagerRule::default(),
            at_risk_missed_posts: 5,
            inactive_missed_posts: 10,
            at_risk_days: 60,
            inactive_days: 120,
            new_subscriber_days: 30,
            cleaning_min_deliveries: 8,
            reengagement_open_rate: 0.3,
        }
    }
}

/// Rating cut points for one metric, expressed as fractions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub excellent: f64,
    pub good: f64,
    /// Absent: everything short of `good` rates `average`
    #[serde(default)]
    pub average: Option<f64>,
    #[serde(default)]
    pub lower_is_better: bool,
}

impl Thresholds {
    pub const fn higher(excellent: f64, good: f64, average: Option<f64>) -> Self {
        Self {
            excellent,
            good,
            average,
            lower_is_better: false,
        }
    }

    pub const fn lower(excellent: f64, good: f64, average: f64) -> Self {
        Self {
            excellent,
            good,
            average: Some(average),
            lower_is_better: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub open_rate: Thresholds,
    pub click_rate: Thresholds,
    pub click_to_open_rate: Thresholds,
    pub conversion_rate: Thresholds,
    pub growth_rate: Thresholds,
    pub churn_rate: Thresholds,
    pub paid_churn: Thresholds,
    pub list_health: Thresholds,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            open_rate: Thresholds::higher(0.45, 0.30, Some(0.20)),
            click_rate: Thresholds::higher(0.05, 0.03, Some(0.02)),
            click_to_open_rate: Thresholds::higher(0.15, 0.10, None),
            conversion_rate: Thresholds::higher(0.10, 0.05, Some(0.02)),
            growth_rate: Thresholds::higher(0.05, 0.02, Some(0.0)),
            churn_rate: Thresholds::lower(0.01, 0.03, 0.05),
            paid_churn: Thresholds::lower(0.01, 0.03, 0.05),
            list_health: Thresholds::higher(0.70, 0.50, Some(0.30)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub attribution_window_days: i64,
    pub growth_period_days: i64,
    /// Trailing period of the long-range growth view
    pub long_growth_period_days: i64,
    pub significant_post_deliveries: u64,
    /// Posts below this multiple of the mean open rate are low performers
    pub low_performer_factor: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            attribution_window_days: 7,
            growth_period_days: 30,
            long_growth_period_days: 90,
            significant_post_deliveries: 50,
            low_performer_factor: 0.7,
        }
    }
}

/// Bucket granularity for the engagement flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Bucketing {
    #[default]
    Month,
    Week,
    Days { days: u32 },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub bucketing: Bucketing,
    pub max_buckets: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Contents of `ssa.toml`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub root_folder: Option<String>,
    pub port: Option<u16>,
    pub logging: LoggingConfig,
    pub segmentation: SegmentationConfig,
    pub benchmarks: BenchmarkConfig,
    pub metrics: MetricsConfig,
    pub flow: FlowConfig,
}

impl AppConfig {
    /// Parse TOML text and validate the engine sections
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.engine().validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        debug!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            segmentation: self.segmentation.clone(),
            benchmarks: self.benchmarks.clone(),
            metrics: self.metrics.clone(),
            flow: self.flow.clone(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

/// Config file location:
/// 1. Command-line argument
/// 2. `SSA_CONFIG` environment variable
/// 3. `<config dir>/ssa/ssa.toml`
pub fn resolve_config_path(cli_arg: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(PathBuf::from(path));
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("ssa").join(CONFIG_FILE_NAME))
}

/// Root folder resolution:
/// 1. Command-line argument (highest priority)
/// 2. `SSA_ROOT_FOLDER` environment variable
/// 3. `root_folder` from the TOML config
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, config: &AppConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        return PathBuf::from(path);
    }
    if let Some(path) = &config.root_folder {
        return PathBuf::from(path);
    }
    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "macos") {
        // ~/Library/Application Support/ssa
        dirs::data_dir()
            .map(|d| d.join("ssa"))
            .unwrap_or_else(|| PathBuf::from("./ssa_data"))
    } else {
        // ~/.local/share/ssa, %LOCALAPPDATA%\ssa
        dirs::data_local_dir()
            .map(|d| d.join("ssa"))
            .unwrap_or_else(|| PathBuf::from("./ssa_data"))
    }
}
