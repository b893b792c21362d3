//! # SSA Common Library
//!
//! Engine shared by the Substack Subscriber Analytics dashboard:
//! - Canonical data model for a Substack export
//! - Schema normalization of the export CSV files
//! - Metrics with benchmark classification
//! - Subscriber segmentation and engagement flow aggregation
//! - Acquisition and trend analyses
//! - Configuration loading and dataset snapshots

pub mod analysis;
pub mod config;
pub mod dataset;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod segments;
pub mod time;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use dataset::{Dataset, Snapshot};
pub use error::{Error, Result};
