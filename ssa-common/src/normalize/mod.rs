//! Schema Normalizer
//!
//! Turns the files of an extracted Substack export into a [`Dataset`].
//!
//! | File                         | Required | Failure handling                 |
//! |------------------------------|----------|----------------------------------|
//! | `email_list*.csv`            | yes      | fatal for the load               |
//! | `posts.csv`                  | yes      | fatal for the load               |
//! | `posts/<id>.delivers.csv`    | no*      | file skipped, notice recorded    |
//! | `posts/<id>.opens.csv`       | no*      | file skipped, notice recorded    |
//! | `posts/<id>.clicks.csv`      | no       | file skipped, notice recorded    |
//! | `subscriber_details.csv`     | no       | file skipped, notice recorded    |
//!
//! (*) Without engagement files every post-level rate is undefined.
//!
//! Row-level failures never fail a file; they are counted per file.

pub mod columns;
pub mod details;
pub mod engagement;
pub mod posts;
pub mod reader;
pub mod subscribers;
pub mod values;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::dataset::{Dataset, LoadReport, Notice};
use crate::{Error, Result};
use engagement::{DeliveryJoin, EngagementKind};

/// Email list file name prefixes, in lookup priority order
pub const EMAIL_LIST_PREFIXES: &[&str] = &["email_list", "email-list", "subscribers"];
pub const POSTS_FILE: &str = "posts.csv";
pub const DETAILS_FILE: &str = "subscriber_details.csv";
pub const POSTS_DIR: &str = "posts";

/// Row accounting for one input file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub file: String,
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub rows_skipped: usize,
}

impl FileReport {
    pub fn new(file: &str, rows_read: usize) -> Self {
        Self {
            file: file.to_string(),
            rows_read,
            rows_loaded: 0,
            rows_skipped: 0,
        }
    }
}

/// Read access to the files of one extracted export.
///
/// Paths are relative and `/`-separated (`posts/123.opens.csv`).
pub trait ExportSource {
    /// All file paths available, sorted
    fn files(&self) -> Result<Vec<String>>;

    /// Raw bytes of one file
    fn read(&self, path: &str) -> Result<Vec<u8>>;
}

/// Export extracted into a directory on disk
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    /// Open `path`, descending into a single wrapper folder when the export
    /// was zipped with one
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(Error::NotFound(format!(
                "Dataset directory not found: {}",
                path.display()
            )));
        }
        let mut root = path.to_path_buf();
        if !has_export_files(&root)? {
            let subdirs: Vec<PathBuf> = WalkDir::new(&root)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_dir() && e.file_name() != POSTS_DIR)
                .map(|e| e.into_path())
                .collect();
            if let [only] = subdirs.as_slice() {
                debug!("Descending into export wrapper folder {}", only.display());
                root = only.clone();
            }
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn has_export_files(dir: &Path) -> Result<bool> {
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let name = entry?.file_name().to_string_lossy().to_string();
        if name == POSTS_FILE || EMAIL_LIST_PREFIXES.iter().any(|p| name.starts_with(p)) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Top-level files and the files directly under `posts/`
fn is_export_entry(entry: &DirEntry) -> bool {
    entry.depth() == 0 || entry.file_type().is_file() || entry.file_name() == POSTS_DIR
}

impl ExportSource for DirSource {
    fn files(&self) -> Result<Vec<String>> {
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .max_depth(2)
            .into_iter()
            .filter_entry(is_export_entry);

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            files.push(parts.join("/"));
        }
        files.sort();
        Ok(files)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = path
            .split('/')
            .fold(self.root.clone(), |acc, part| acc.join(part));
        Ok(std::fs::read(full)?)
    }
}

/// In-memory export, used by tests and by callers that already hold the bytes
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.to_string(), contents.into());
        self
    }
}

impl ExportSource for MemorySource {
    fn files(&self) -> Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }
}

/// Locate the email list: first prefix in priority order, then name order
pub fn find_email_list(files: &[String]) -> Option<&String> {
    EMAIL_LIST_PREFIXES.iter().find_map(|prefix| {
        files
            .iter()
            .filter(|f| !f.contains('/'))
            .find(|f| f.starts_with(prefix) && f.ends_with(".csv"))
    })
}

fn record_skips(report: &mut LoadReport, file: &FileReport) {
    if file.rows_skipped > 0 {
        warn!("{}: skipped {} unparsable row(s)", file.file, file.rows_skipped);
        report.notices.push(Notice::from(&Error::UnparsableRow {
            file: file.file.clone(),
            skipped: file.rows_skipped,
        }));
    }
    report.files.push(file.clone());
}

/// Load and normalize a complete export.
///
/// Fails only for problems with the required files; everything else is
/// recorded in the dataset's [`LoadReport`].
pub fn load_dataset(source: &dyn ExportSource, id: &str, name: &str) -> Result<Dataset> {
    let files = source.files()?;
    let mut report = LoadReport::default();

    // Required: email list
    let email_list = find_email_list(&files)
        .ok_or_else(|| Error::MissingRequiredFile {
            file: "email_list*.csv".to_string(),
        })?
        .clone();
    if !files.iter().any(|f| f == POSTS_FILE) {
        return Err(Error::MissingRequiredFile {
            file: POSTS_FILE.to_string(),
        });
    }

    let table = reader::read_table(&email_list, &source.read(&email_list)?)?;
    let (mut subscribers, file_report) = subscribers::normalize_subscribers(&table)?;
    record_skips(&mut report, &file_report);
    info!("Loaded {} subscribers from {}", subscribers.len(), email_list);

    // Required: posts
    let table = reader::read_table(POSTS_FILE, &source.read(POSTS_FILE)?)?;
    let (posts, file_report) = posts::normalize_posts(&table)?;
    record_skips(&mut report, &file_report);
    info!("Loaded {} posts", posts.len());

    // Optional: per-post engagement
    let mut join = DeliveryJoin::new();
    let mut engagement_files = 0usize;
    for path in files.iter().filter(|f| f.starts_with("posts/")) {
        let Some((kind, id_from_name)) = EngagementKind::from_file_name(path) else {
            continue;
        };
        engagement_files += 1;
        let parsed = source
            .read(path)
            .and_then(|bytes| reader::read_table(path, &bytes))
            .and_then(|table| engagement::parse_engagement_file(&table, id_from_name));
        match parsed {
            Ok((rows, file_report)) => {
                debug!("{}: {} row(s)", path, rows.len());
                join.add(kind, rows);
                record_skips(&mut report, &file_report);
            }
            Err(e) => {
                warn!("Skipping engagement file {}: {}", path, e);
                report.notices.push(Notice::from(&e));
            }
        }
    }
    report.clicks_available = join.has_click_data();
    let deliveries = join.finish();
    report.engagement_available = !deliveries.is_empty();
    if engagement_files == 0 {
        warn!("No per-post engagement files found; post-level metrics will be undefined");
        report.unavailable.push("posts/*.delivers.csv".to_string());
    }
    info!("Loaded {} delivery events", deliveries.len());

    // Optional: subscriber details
    if files.iter().any(|f| f == DETAILS_FILE) {
        let parsed = source
            .read(DETAILS_FILE)
            .and_then(|bytes| reader::read_table(DETAILS_FILE, &bytes))
            .and_then(|table| details::normalize_details(&table));
        match parsed {
            Ok((mut by_email, file_report)) => {
                record_skips(&mut report, &file_report);
                let mut matched = 0usize;
                for subscriber in subscribers.iter_mut() {
                    if let Some(d) = by_email.remove(&subscriber.email) {
                        if subscriber.source.is_none() {
                            subscriber.source = d.source_free.clone();
                        }
                        subscriber.details = Some(d);
                        matched += 1;
                    }
                }
                report.details_available = true;
                info!("Enriched {} subscriber(s) from {}", matched, DETAILS_FILE);
            }
            Err(e) => {
                warn!("Skipping optional {}: {}", DETAILS_FILE, e);
                report.notices.push(Notice::from(&e));
                report.unavailable.push(DETAILS_FILE.to_string());
            }
        }
    } else {
        debug!("No {} in export", DETAILS_FILE);
        report.unavailable.push(DETAILS_FILE.to_string());
    }

    if subscribers.is_empty() || posts.is_empty() {
        let notice = Error::EmptyDataset {
            subscribers: subscribers.len(),
            posts: posts.len(),
        };
        warn!("{}", notice);
        report.notices.push(Notice::from(&notice));
    }

    Ok(Dataset::new(id, name, subscribers, posts, deliveries, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_email_list_prefers_canonical_prefix() {
        let files = vec![
            "email-list.old.csv".to_string(),
            "email_list.pub.csv".to_string(),
            "posts.csv".to_string(),
        ];
        assert_eq!(find_email_list(&files).unwrap(), "email_list.pub.csv");
    }

    #[test]
    fn test_find_email_list_ignores_nested_files() {
        let files = vec!["posts/email_list.csv".to_string()];
        assert!(find_email_list(&files).is_none());
    }

    #[test]
    fn test_memory_source_lists_sorted() {
        let source = MemorySource::new()
            .with_file("posts.csv", "post_id\n")
            .with_file("email_list.a.csv", "email,created_at\n");
        assert_eq!(
            source.files().unwrap(),
            vec!["email_list.a.csv".to_string(), "posts.csv".to_string()]
        );
        assert!(source.read("missing.csv").is_err());
    }
}
