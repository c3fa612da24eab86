//! Pack-container storage backend.

use std::path::Path;

use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::Result;
use crate::keys::LogicalPath;
use crate::pack::PackReader;

/// Backend over a finalized pack container.
///
/// Thin adapter: [`PackReader`] already loads the index at open and serves
/// lock-guarded positioned reads, which is exactly the backend contract.
pub struct PackBackend {
    reader: PackReader,
}

impl PackBackend {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self { reader: PackReader::open(path)? })
    }
}

impl StorageBackend for PackBackend {
    fn exists(&self, name: &str) -> bool {
        self.reader.contains(name)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.reader.read(name)
    }

    fn list(&self) -> Result<Vec<LogicalPath>> {
        let mut out = Vec::with_capacity(self.reader.len());
        for name in self.reader.names() {
            match LogicalPath::parse(name) {
                Ok(p) => out.push(p),
                Err(_) => debug!(member = %name, "skipping non-member entry in pack backend"),
            }
        }
        Ok(out)
    }
}
