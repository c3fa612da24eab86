//! Configuration loading.
//!
//! Defaults, an optional JSON settings file, and `FRAMEPACK_*` environment
//! variables are layered in that order; command-line flags are applied on
//! top by the caller. Invalid values are rejected here, before any job runs.

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::convert::OutputMode;
use crate::error::{Error, Result};
use crate::keys::DEFAULT_PAD_WIDTH;

/// Name of the settings file searched in the working directory.
const DEFAULT_FILE: &str = "framepack.json";

/// Resolved batch defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Frame-index zero-padding width used when rendering logical paths.
    #[serde(default = "default_pad_width")]
    pub pad_width: usize,

    /// Worker thread count; 0 auto-detects from the CPU count.
    #[serde(default)]
    pub workers: usize,

    /// Default output mode for `convert`.
    #[serde(default)]
    pub mode: OutputMode,
}

fn default_pad_width() -> usize {
    DEFAULT_PAD_WIDTH
}

impl Default for Settings {
    fn default() -> Self {
        Self { pad_width: DEFAULT_PAD_WIDTH, workers: 0, mode: OutputMode::default() }
    }
}

impl Settings {
    /// Load settings, layering an optional explicit file over the defaults.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        builder = match file {
            Some(path) => {
                let path = path.to_str().ok_or_else(|| {
                    Error::Config("configuration file path is not valid UTF-8".to_string())
                })?;
                builder.add_source(File::new(path, FileFormat::Json))
            }
            None => builder.add_source(File::new(DEFAULT_FILE, FileFormat::Json).required(false)),
        };
        builder = builder.add_source(Environment::with_prefix("FRAMEPACK"));

        let settings: Settings = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values no run could make sense of.
    pub fn validate(&self) -> Result<()> {
        // A u64 frame index never needs more than 20 decimal digits.
        if self.pad_width == 0 || self.pad_width > 20 {
            return Err(Error::Config(format!(
                "pad_width must be between 1 and 20, got {}",
                self.pad_width
            )));
        }
        Ok(())
    }

    /// Worker count with the auto-detect default applied.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}
