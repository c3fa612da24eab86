use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for all operations in the `framepack` crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A member name does not follow `<sequence>/<frame>_<group>_<view>.<ext>`.
    /// Always indicates bad input data or an unsupported legacy naming scheme.
    #[error("malformed logical path '{name}': {reason}")]
    MalformedPath { name: String, reason: &'static str },

    /// A requested logical path is absent from the backend.
    #[error("logical path not found: '{0}'")]
    NotFound(String),

    /// A source archive could not be parsed or the external decoder failed.
    #[error("failed to decode '{path}': {reason}", path = .path.display())]
    Decode { path: PathBuf, reason: String },

    /// An output artifact could not be written or finalized.
    #[error("failed to write '{path}': {source}", path = .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source enumeration matched no convertible inputs.
    #[error("no conversion sources matched the given inputs")]
    NoSources,

    /// Malformed configuration or option values. Fatal at startup, before any job runs.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An I/O error, with the path where it happened.
    #[error("I/O error on path '{path}': {source}", path = .path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// An error from the underlying zip reader or writer.
    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// An error during serialization or deserialization of a pack index.
    #[error("index serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Attach a path to a bare `std::io::Error`.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Error::Io { source, path: path.into() }
    }

    pub fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Decode { path: path.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
