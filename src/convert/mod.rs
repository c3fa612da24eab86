//! The conversion pipeline: release archives and videos in, uniform
//! logical-path storage out.
//!
//! - [`job`]: one source → one batch of blobs.
//! - [`sink`]: per-job output staging and promotion.
//! - [`video`]: external-decoder frame extraction.
//! - [`scheduler`]: worker pool, failure aggregation, the pack merge writer.

pub mod job;
pub mod scheduler;
pub mod sink;
pub mod video;

pub use job::{JobOptions, JobSpec, SourceKind};
pub use scheduler::{run_batch, BatchPlan, BatchReport, JobFailure};

use std::fmt;

use clap::ValueEnum;
use serde::Deserialize;

/// Where a conversion batch puts its blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Plain directory tree mirroring logical paths.
    Folder,
    /// One zip archive per source.
    Zip,
    /// One tar archive per source.
    Tar,
    /// A single pack container, the training-time read format.
    Pack,
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Pack
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputMode::Folder => "folder",
            OutputMode::Zip => "zip",
            OutputMode::Tar => "tar",
            OutputMode::Pack => "pack",
        };
        f.write_str(s)
    }
}
