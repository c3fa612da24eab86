use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::convert::OutputMode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a JSON settings file (defaults to ./framepack.json if present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Convert release archives and videos into a storage backend.
    #[command(alias = "c")]
    Convert {
        /// Source archives/videos, or directories to scan for them.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output root: a directory for folder/zip/tar modes, the pack file
        /// for pack mode.
        #[arg(short, long)]
        output: PathBuf,

        /// Output mode. [default: from settings]
        #[arg(long, value_enum)]
        mode: Option<OutputMode>,

        /// Number of parallel worker threads. [0 = auto-detect based on CPU cores]
        #[arg(long)]
        workers: Option<usize>,

        /// Frame-index zero-padding width for emitted member names.
        #[arg(long)]
        pad_width: Option<usize>,

        /// Only convert sources whose relative path matches this regex.
        #[arg(long)]
        filter: Option<String>,

        /// Re-convert sources whose output already exists.
        #[arg(long)]
        overwrite: bool,
    },

    /// List the logical paths served by a backend root.
    #[command(alias = "l")]
    List {
        /// A dataset directory, zip archive, or pack file.
        root: PathBuf,
    },

    /// Write the bytes of one logical path to stdout.
    Cat {
        /// A dataset directory, zip archive, or pack file.
        root: PathBuf,

        /// Logical path, e.g. 'seq001/00000000_img_front.jpg'.
        name: String,
    },
}

/// Parses command-line arguments using `clap`.
pub fn parse() -> Args {
    Args::parse()
}
