//! Per-job blob sinks.
//!
//! A conversion job never touches its final output directly: blobs go into a
//! sink bound to the job's own output unit, staged in a temporary location
//! and promoted only when the job succeeds. Dropping an unfinished sink
//! discards the staging area, which is all the cleanup a failed job needs.
//!
//! Zip and tar sinks write fixed member metadata (timestamps, permissions)
//! so that re-running a conversion reproduces byte-identical archives.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};

use crate::error::{Error, Result};
use crate::pack::{PackPart, PartWriter};

/// What a finished sink leaves behind.
pub enum SinkOutput {
    /// The job's output unit was promoted to its final location.
    Persisted,
    /// A sealed pack part, to be merged by the single pack writer.
    Part(PackPart),
}

/// Destination for the blobs of one conversion job.
pub trait BlobSink: Send {
    /// Persist one blob under its canonical logical name.
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Finalize the output unit. Only called after every `put` succeeded.
    fn finish(self: Box<Self>) -> Result<SinkOutput>;
}

/// Writes blobs as plain files under a directory root.
///
/// Blobs are staged in a scratch directory on the same filesystem and moved
/// into place on finish, so readers never observe half-written files.
pub struct FolderSink {
    root: PathBuf,
    stage: TempDir,
    written: Vec<String>,
}

impl FolderSink {
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| Error::io(e, root))?;
        let stage = tempfile::Builder::new()
            .prefix(".convert-stage-")
            .tempdir_in(root)
            .map_err(|e| Error::io(e, root))?;
        Ok(Self { root: root.to_path_buf(), stage, written: Vec::new() })
    }
}

impl BlobSink for FolderSink {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let staged = self.stage.path().join(name);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent))?;
        }
        fs::write(&staged, bytes).map_err(|e| Error::Write { path: staged.clone(), source: e })?;
        self.written.push(name.to_string());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<SinkOutput> {
        for name in &self.written {
            let target = self.root.join(name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io(e, parent))?;
            }
            fs::rename(self.stage.path().join(name), &target)
                .map_err(|e| Error::Write { path: target.clone(), source: e })?;
        }
        Ok(SinkOutput::Persisted)
    }
}

/// Writes blobs as members of a single zip archive.
pub struct ZipSink {
    tmp: NamedTempFile,
    writer: zip::ZipWriter<File>,
    dest: PathBuf,
}

impl ZipSink {
    pub fn create(dest: &Path) -> Result<Self> {
        let dir = dest.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(|e| Error::io(e, dir))?;
        let tmp = tempfile::Builder::new()
            .prefix(".zip-stage-")
            .tempfile_in(dir)
            .map_err(|e| Error::io(e, dir))?;
        // Independent handle at offset 0; the NamedTempFile keeps the path
        // alive for the final persist.
        let file = tmp.reopen().map_err(|e| Error::io(e, tmp.path()))?;
        Ok(Self { tmp, writer: zip::ZipWriter::new(file), dest: dest.to_path_buf() })
    }

    fn options() -> zip::write::FileOptions {
        // Payloads are already-compressed media; store them, with fixed
        // metadata so identical inputs produce identical archives.
        zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(0o644)
    }
}

impl BlobSink for ZipSink {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.writer.start_file(name, Self::options())?;
        self.writer
            .write_all(bytes)
            .map_err(|e| Error::Write { path: self.dest.clone(), source: e })?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<SinkOutput> {
        let Self { tmp, mut writer, dest } = *self;
        writer.finish()?;
        tmp.persist(&dest)
            .map_err(|e| Error::Write { path: dest.clone(), source: e.error })?;
        Ok(SinkOutput::Persisted)
    }
}

/// Writes blobs as members of a single tar archive.
pub struct TarSink {
    tmp: NamedTempFile,
    builder: tar::Builder<File>,
    dest: PathBuf,
}

impl TarSink {
    pub fn create(dest: &Path) -> Result<Self> {
        let dir = dest.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(|e| Error::io(e, dir))?;
        let tmp = tempfile::Builder::new()
            .prefix(".tar-stage-")
            .tempfile_in(dir)
            .map_err(|e| Error::io(e, dir))?;
        let file = tmp.reopen().map_err(|e| Error::io(e, tmp.path()))?;
        Ok(Self { tmp, builder: tar::Builder::new(file), dest: dest.to_path_buf() })
    }
}

impl BlobSink for TarSink {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let write_err = |e| Error::Write { path: self.dest.clone(), source: e };
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        self.builder.append_data(&mut header, name, bytes).map_err(write_err)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<SinkOutput> {
        let Self { tmp, builder, dest } = *self;
        let mut file = builder
            .into_inner()
            .map_err(|e| Error::Write { path: dest.clone(), source: e })?;
        file.flush().map_err(|e| Error::Write { path: dest.clone(), source: e })?;
        tmp.persist(&dest)
            .map_err(|e| Error::Write { path: dest.clone(), source: e.error })?;
        Ok(SinkOutput::Persisted)
    }
}

/// Stages blobs in a per-job pack part for the single merge writer.
pub struct PartSink {
    part: PartWriter,
}

impl PartSink {
    /// `stage_dir` must be on the same filesystem as the final pack.
    pub fn create(stage_dir: &Path) -> Result<Self> {
        Ok(Self { part: PartWriter::create(stage_dir)? })
    }
}

impl BlobSink for PartSink {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.part.put(name, bytes)
    }

    fn finish(self: Box<Self>) -> Result<SinkOutput> {
        Ok(SinkOutput::Part(self.part.finish()?))
    }
}
