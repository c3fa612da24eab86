//! Zip-archive storage backend.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::backend::StorageBackend;
use crate::error::{Error, Result};
use crate::keys::LogicalPath;

/// Backend over a zip archive.
///
/// The central directory is scanned once at open; member bytes are decoded
/// lazily on first read. Zip readers are not reentrant over a single file
/// descriptor, so the archive handle sits behind a lock: a shared
/// `ZipBackend` is safe from many reader threads, reads are just serialized.
pub struct ZipBackend {
    path: PathBuf,
    archive: Mutex<ZipArchive<BufReader<File>>>,
    /// Member names in central-directory order, with their archive indices.
    names: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl ZipBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(e, path))?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let mut names = Vec::with_capacity(archive.len());
        let mut by_name = HashMap::with_capacity(archive.len());
        for i in 0..archive.len() {
            // Raw access: we only need the member name, not its bytes.
            let member = archive.by_index_raw(i)?;
            let name = member.name().to_string();
            by_name.insert(name.clone(), i);
            names.push(name);
        }
        Ok(Self { path: path.to_path_buf(), archive: Mutex::new(archive), names, by_name })
    }
}

impl StorageBackend for ZipBackend {
    fn exists(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let &index = self.by_name.get(name).ok_or_else(|| Error::NotFound(name.to_string()))?;
        let mut archive = self.archive.lock().unwrap();
        let mut member = match archive.by_index(index) {
            Ok(m) => m,
            Err(ZipError::FileNotFound) => return Err(Error::NotFound(name.to_string())),
            Err(e) => return Err(e.into()),
        };
        let mut buf = Vec::with_capacity(member.size() as usize);
        member
            .read_to_end(&mut buf)
            .map_err(|e| Error::io(e, &self.path))?;
        Ok(buf)
    }

    fn list(&self) -> Result<Vec<LogicalPath>> {
        let mut out = Vec::with_capacity(self.names.len());
        for name in &self.names {
            if name.ends_with('/') {
                continue; // directory entry
            }
            match LogicalPath::parse(name) {
                Ok(p) => out.push(p),
                Err(_) => debug!(member = %name, "skipping non-member entry in zip backend"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture_zip(dir: &Path) -> PathBuf {
        let path = dir.join("seq001.zip");
        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.start_file("seq001/00000000_img_front.jpg", options).unwrap();
        writer.write_all(b"front-frame-0").unwrap();
        writer.start_file("seq001/00000001_img_front.jpg", options).unwrap();
        writer.write_all(b"front-frame-1").unwrap();
        writer.finish().unwrap();
        path
    }

    #[test]
    fn reads_members_by_logical_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture_zip(dir.path());
        let backend = ZipBackend::open(&path).unwrap();

        assert!(backend.exists("seq001/00000000_img_front.jpg"));
        assert_eq!(backend.read("seq001/00000001_img_front.jpg").unwrap(), b"front-frame-1");
        assert!(matches!(
            backend.read("seq001/00000002_img_front.jpg"),
            Err(Error::NotFound(_))
        ));
        assert_eq!(backend.list().unwrap().len(), 2);
    }

    #[test]
    fn shared_handle_serves_concurrent_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture_zip(dir.path());
        let backend = std::sync::Arc::new(ZipBackend::open(&path).unwrap());

        std::thread::scope(|s| {
            for _ in 0..4 {
                let backend = backend.clone();
                s.spawn(move || {
                    for _ in 0..16 {
                        let bytes = backend.read("seq001/00000000_img_front.jpg").unwrap();
                        assert_eq!(bytes, b"front-frame-0");
                    }
                });
            }
        });
    }
}
