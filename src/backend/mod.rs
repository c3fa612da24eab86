//! Storage backends.
//!
//! A backend binds to exactly one root (a directory tree, a zip archive, or
//! a pack container) and serves uniform random-access reads by logical path.
//! All variants yield identical bytes for the same logical path and dataset
//! release; that equivalence is the reason this layer exists. The variant set
//! is closed, so dispatch is a plain sniff in [`open_backend`] rather than
//! open-ended plugin registration.

mod pack;
mod zip;

pub use pack::PackBackend;
pub use zip::ZipBackend;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::keys::LogicalPath;

/// Uniform read capabilities over one dataset root.
///
/// Opening is a variant constructor; closing happens on drop. Handles are
/// shareable across reader threads: the directory variant is stateless, the
/// zip and pack variants guard their file handle internally.
pub trait StorageBackend: Send + Sync {
    /// Whether the backend can serve `name`.
    fn exists(&self, name: &str) -> bool;

    /// Fetch the raw bytes stored under a logical path.
    ///
    /// An absent path is [`Error::NotFound`]; this never silently returns
    /// empty bytes.
    fn read(&self, name: &str) -> Result<Vec<u8>>;

    /// Enumerate every logical path served by this backend.
    fn list(&self) -> Result<Vec<LogicalPath>>;
}

/// Open the appropriate backend for `root`.
///
/// A directory opens as a folder backend; a file is sniffed for the pack
/// footer magic first, then for a `.zip` extension.
pub fn open_backend(root: &Path) -> Result<Box<dyn StorageBackend>> {
    let meta = fs::metadata(root).map_err(|e| Error::io(e, root))?;
    if meta.is_dir() {
        return Ok(Box::new(FolderBackend::open(root)?));
    }
    if crate::pack::is_pack_file(root).map_err(|e| Error::io(e, root))? {
        return Ok(Box::new(PackBackend::open(root)?));
    }
    if root.extension().and_then(|e| e.to_str()) == Some("zip") {
        return Ok(Box::new(ZipBackend::open(root)?));
    }
    Err(Error::decode(root, "root is neither a directory, a zip archive, nor a pack container"))
}

/// Backend over a plain directory tree mirroring logical paths.
pub struct FolderBackend {
    root: PathBuf,
}

impl FolderBackend {
    pub fn open(root: &Path) -> Result<Self> {
        let meta = fs::metadata(root).map_err(|e| Error::io(e, root))?;
        if !meta.is_dir() {
            return Err(Error::decode(root, "folder backend root is not a directory"));
        }
        Ok(Self { root: root.to_path_buf() })
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        // Parsing validates the two-component shape, which also rules out
        // traversal outside the root.
        LogicalPath::parse(name)?;
        Ok(self.root.join(name))
    }
}

impl StorageBackend for FolderBackend {
    fn exists(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(name.to_string())
            } else {
                Error::io(e, path)
            }
        })
    }

    fn list(&self) -> Result<Vec<LogicalPath>> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.root).to_path_buf();
                Error::io(e.into_io_error().unwrap_or_else(|| std::io::Error::other("walk error")), path)
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            match LogicalPath::parse(&rel) {
                Ok(p) => out.push(p),
                // Stray files (checksums, readmes) are not dataset members.
                Err(_) => debug!(file = %rel, "skipping non-member file in folder backend"),
            }
        }
        Ok(out)
    }
}
