//! # The Pack Container Format
//!
//! A pack (`.fpk`) is the single-file, random-access store consumed by
//! training-time readers. The layout is deliberately simple:
//!
//! 1. **Blob region**: raw byte payloads concatenated back-to-back. Payloads
//!    are stored verbatim: release data is already-compressed media (JPEG,
//!    PNG, compressed point clouds), so the container optimizes for one
//!    positioned read per blob rather than for ratio.
//! 2. **JSON index**: a `zstd`-compressed JSON object mapping each logical
//!    path to `(offset, size, crc32)`.
//! 3. **Footer**: a fixed 24-byte block at the very end of the file:
//!    - `index_comp_size: u64`: size of the compressed JSON index,
//!    - `index_json_size: u64`: size of the uncompressed JSON index,
//!    - `magic_bytes: [u8; 8]`: the signature `b"FPAKIDX1"`.
//!
//! A reader seeks to the footer, locates and decompresses the index, and then
//! serves every `read` with a single positioned read of the blob region.
//!
//! Exactly one [`PackWriter`] ever owns an output file. Conversion workers
//! stage their blobs in per-job [`PartWriter`]s; completed parts are appended
//! by the single writer in job order, which keeps the final artifact
//! byte-deterministic regardless of worker scheduling.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Magic footer signature for the pack index (version 1).
pub const PACK_MAGIC: &[u8; 8] = b"FPAKIDX1";

/// Canonical file extension for pack containers.
pub const PACK_EXT: &str = "fpk";

const FOOTER_LEN: u64 = 24;

/// Index record for a single blob.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BlobEntry {
    /// The canonical logical path of the blob.
    pub path: String,
    /// Byte offset of the payload within the blob region.
    pub offset: u64,
    /// Payload size in bytes.
    pub size: u64,
    /// CRC32 of the payload, verified on read.
    pub crc32: u32,
}

/// The serialized index of a pack container.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct PackIndex {
    /// Format version; bumped on incompatible layout changes.
    pub version: u16,
    /// All blobs, in file order.
    pub entries: Vec<BlobEntry>,
}

const PACK_VERSION: u16 = 1;

/// Checks whether a file carries the pack footer magic.
///
/// Cheap sniff used to dispatch storage-backend opening without parsing the
/// full index.
pub fn is_pack_file(path: &Path) -> std::io::Result<bool> {
    let mut f = File::open(path)?;
    let len = f.metadata()?.len();
    if len < FOOTER_LEN {
        return Ok(false);
    }
    f.seek(SeekFrom::End(-8))?;
    let mut magic = [0u8; 8];
    f.read_exact(&mut magic)?;
    Ok(&magic == PACK_MAGIC)
}

/// The single writer that owns a pack output file.
///
/// Data is staged in a temporary file next to the destination and promoted
/// with an atomic rename in [`PackWriter::finalize`]; an abandoned writer
/// leaves no partial artifact behind.
pub struct PackWriter {
    tmp: NamedTempFile,
    dest: PathBuf,
    entries: Vec<BlobEntry>,
    offset: u64,
}

impl PackWriter {
    /// Start a new pack destined for `dest`.
    pub fn create(dest: &Path) -> Result<Self> {
        let dir = dest.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(|e| Error::io(e, dir))?;
        let tmp = tempfile::Builder::new()
            .prefix(".fpk-stage-")
            .tempfile_in(dir)
            .map_err(|e| Error::io(e, dir))?;
        Ok(Self { tmp, dest: dest.to_path_buf(), entries: Vec::new(), offset: 0 })
    }

    /// Append one blob under its logical path.
    pub fn put(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        let crc32 = crc32fast::hash(bytes);
        self.tmp
            .as_file_mut()
            .write_all(bytes)
            .map_err(|e| Error::Write { path: self.dest.clone(), source: e })?;
        self.entries.push(BlobEntry {
            path: path.to_string(),
            offset: self.offset,
            size: bytes.len() as u64,
            crc32,
        });
        self.offset += bytes.len() as u64;
        Ok(())
    }

    /// Append a completed per-job part, rebasing its entry offsets.
    pub fn append_part(&mut self, part: PackPart) -> Result<()> {
        let PackPart { mut file, entries, size } = part;
        file.as_file_mut()
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::Write { path: self.dest.clone(), source: e })?;
        let copied = std::io::copy(file.as_file_mut(), self.tmp.as_file_mut())
            .map_err(|e| Error::Write { path: self.dest.clone(), source: e })?;
        if copied != size {
            return Err(Error::Write {
                path: self.dest.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("part truncated: {copied} of {size} bytes"),
                ),
            });
        }
        let base = self.offset;
        self.entries.extend(entries.into_iter().map(|mut e| {
            e.offset += base;
            e
        }));
        self.offset += size;
        Ok(())
    }

    /// Number of blobs written so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the compressed index and footer, then promote the staged file to
    /// its destination.
    pub fn finalize(mut self) -> Result<()> {
        let index = PackIndex { version: PACK_VERSION, entries: std::mem::take(&mut self.entries) };
        let index_json = serde_json::to_vec(&index)?;
        let index_comp = zstd::encode_all(index_json.as_slice(), 3)
            .map_err(|e| Error::Write { path: self.dest.clone(), source: e })?;

        let file = self.tmp.as_file_mut();
        let write_err = |e| Error::Write { path: self.dest.clone(), source: e };
        file.write_all(&index_comp).map_err(write_err)?;
        file.write_all(&(index_comp.len() as u64).to_le_bytes()).map_err(write_err)?;
        file.write_all(&(index_json.len() as u64).to_le_bytes()).map_err(write_err)?;
        file.write_all(PACK_MAGIC).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;

        self.tmp
            .persist(&self.dest)
            .map_err(|e| Error::Write { path: self.dest.clone(), source: e.error })?;
        Ok(())
    }
}

/// A per-job staging fragment of a pack.
///
/// Workers write blobs into a part; only a *complete* part is handed to the
/// pack writer. Dropping an unfinished part removes its temporary file, which
/// is how a failed job's partial output is discarded.
pub struct PartWriter {
    tmp: NamedTempFile,
    entries: Vec<BlobEntry>,
    offset: u64,
}

impl PartWriter {
    /// Stage a new part in `dir` (kept on the same filesystem as the final
    /// pack so the writer's copy is a plain sequential read).
    pub fn create(dir: &Path) -> Result<Self> {
        let tmp = tempfile::Builder::new()
            .prefix(".fpk-part-")
            .tempfile_in(dir)
            .map_err(|e| Error::io(e, dir))?;
        Ok(Self { tmp, entries: Vec::new(), offset: 0 })
    }

    /// Append one blob to the part.
    pub fn put(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        let crc32 = crc32fast::hash(bytes);
        self.tmp
            .as_file_mut()
            .write_all(bytes)
            .map_err(|e| Error::io(e, self.tmp.path()))?;
        self.entries.push(BlobEntry {
            path: path.to_string(),
            offset: self.offset,
            size: bytes.len() as u64,
            crc32,
        });
        self.offset += bytes.len() as u64;
        Ok(())
    }

    /// Seal the part for hand-off to the pack writer.
    pub fn finish(mut self) -> Result<PackPart> {
        self.tmp
            .as_file_mut()
            .flush()
            .map_err(|e| Error::io(e, self.tmp.path()))?;
        Ok(PackPart { file: self.tmp, entries: self.entries, size: self.offset })
    }
}

/// A sealed part ready to be merged into the final pack.
pub struct PackPart {
    file: NamedTempFile,
    entries: Vec<BlobEntry>,
    size: u64,
}

impl PackPart {
    pub fn blob_count(&self) -> usize {
        self.entries.len()
    }

    pub fn byte_size(&self) -> u64 {
        self.size
    }
}

/// Read side of a pack container.
///
/// The index is parsed once at open; every `read` is a positioned read of the
/// blob region behind an internal lock, so one reader handle can be shared
/// across threads.
pub struct PackReader {
    path: PathBuf,
    file: Mutex<File>,
    entries: Vec<BlobEntry>,
    by_path: HashMap<String, usize>,
}

impl PackReader {
    /// Open a pack and load its index.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| Error::io(e, path))?;
        let len = file.metadata().map_err(|e| Error::io(e, path))?.len();
        if len < FOOTER_LEN {
            return Err(Error::decode(path, "file too small to hold a pack footer"));
        }

        file.seek(SeekFrom::End(-(FOOTER_LEN as i64))).map_err(|e| Error::io(e, path))?;
        let mut footer = [0u8; FOOTER_LEN as usize];
        file.read_exact(&mut footer).map_err(|e| Error::io(e, path))?;
        let (comp_size_bytes, rest) = footer.split_at(8);
        let (json_size_bytes, magic) = rest.split_at(8);
        if magic != PACK_MAGIC {
            return Err(Error::decode(path, "missing pack footer magic"));
        }
        let index_comp_size = u64::from_le_bytes(comp_size_bytes.try_into().unwrap());
        let index_json_size = u64::from_le_bytes(json_size_bytes.try_into().unwrap());
        if index_comp_size > len - FOOTER_LEN {
            return Err(Error::decode(path, "pack index extends past start of file"));
        }

        file.seek(SeekFrom::Start(len - FOOTER_LEN - index_comp_size))
            .map_err(|e| Error::io(e, path))?;
        let mut index_comp = vec![0u8; index_comp_size as usize];
        file.read_exact(&mut index_comp).map_err(|e| Error::io(e, path))?;
        let index_json = zstd::decode_all(index_comp.as_slice())
            .map_err(|_| Error::decode(path, "pack index is not valid zstd data"))?;
        if index_json.len() as u64 != index_json_size {
            return Err(Error::decode(path, "pack index size does not match footer"));
        }
        let index: PackIndex = serde_json::from_slice(&index_json)?;
        if index.version != PACK_VERSION {
            return Err(Error::decode(path, "unsupported pack version"));
        }

        let mut by_path = HashMap::with_capacity(index.entries.len());
        for (i, entry) in index.entries.iter().enumerate() {
            by_path.insert(entry.path.clone(), i);
        }
        Ok(Self { path: path.to_path_buf(), file: Mutex::new(file), entries: index.entries, by_path })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_path.contains_key(name)
    }

    /// Logical paths in blob-region order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch one blob, verifying its recorded CRC32.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let entry = match self.by_path.get(name) {
            Some(&i) => &self.entries[i],
            None => return Err(Error::NotFound(name.to_string())),
        };
        let mut buf = vec![0u8; entry.size as usize];
        {
            let mut file = self.file.lock().unwrap();
            file.seek(SeekFrom::Start(entry.offset)).map_err(|e| Error::io(e, &self.path))?;
            file.read_exact(&mut buf).map_err(|e| Error::io(e, &self.path))?;
        }
        if crc32fast::hash(&buf) != entry.crc32 {
            return Err(Error::decode(&self.path, format!("crc mismatch for '{name}'")));
        }
        Ok(buf)
    }
}
