//! Conversion jobs.
//!
//! One job converts one source (a zip archive, a tar archive, or a bare
//! video file) into a batch of logical-path blobs pushed through the job's
//! sink. Jobs share nothing: a failure aborts only the job in progress and
//! its sink's staging area, never a sibling.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::convert::sink::BlobSink;
use crate::convert::video;
use crate::error::{Error, Result};
use crate::keys::{DataGroup, LogicalPath};
use crate::progress::BatchProgress;

/// Source container kinds the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Zip,
    Tar,
    Video,
}

const VIDEO_EXTS: [&str; 5] = ["mp4", "mov", "avi", "mkv", "webm"];

impl SourceKind {
    /// Classify a path by extension; `None` for files the pipeline skips.
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "zip" => Some(SourceKind::Zip),
            "tar" => Some(SourceKind::Tar),
            _ if VIDEO_EXTS.contains(&ext.as_str()) => Some(SourceKind::Video),
            _ => None,
        }
    }
}

/// One unit of conversion work.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Position in the sorted source enumeration; merge order for pack output.
    pub id: usize,
    /// Absolute (as given) source path.
    pub source: PathBuf,
    /// Source path relative to its enumeration base, `/`-separated. Names the
    /// per-source output unit so same-named archives from different
    /// subdirectories do not collide.
    pub rel: String,
    pub kind: SourceKind,
}

/// Per-job knobs shared by every source kind.
#[derive(Debug, Clone, Copy)]
pub struct JobOptions {
    pub pad_width: usize,
}

/// Run one job to completion, pushing every blob through `sink`.
pub fn run_job(
    spec: &JobSpec,
    opts: JobOptions,
    sink: &mut dyn BlobSink,
    progress: &BatchProgress,
) -> Result<()> {
    match spec.kind {
        SourceKind::Zip => convert_zip(&spec.source, opts, sink, progress),
        SourceKind::Tar => convert_tar(&spec.source, opts, sink, progress),
        SourceKind::Video => convert_video(&spec.source, &spec.rel, opts, sink, progress),
    }
}

/// Derive `(sequence, group, view)` for a release video.
///
/// Videos are laid out as `<sequence>/<group>_<view>.<ext>`: the sequence is
/// the parent directory name, the stem carries the group and view.
fn video_identity(member: &str) -> Result<(String, DataGroup, String)> {
    let malformed = |reason| Error::MalformedPath { name: member.to_string(), reason };
    let (dir, file) = member
        .rsplit_once('/')
        .ok_or_else(|| malformed("video member has no sequence directory"))?;
    let sequence = dir.rsplit('/').next().unwrap_or(dir);
    if sequence.is_empty() {
        return Err(malformed("empty sequence directory"));
    }
    let stem = file
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .ok_or_else(|| malformed("video member has no extension"))?;
    let (group, view) = DataGroup::split_view(stem)
        .ok_or_else(|| malformed("video stem is not '<group>_<view>'"))?;
    if view.is_empty() {
        return Err(malformed("empty view in video stem"));
    }
    Ok((sequence.to_string(), group, view.to_string()))
}

/// Re-render an archive member name through the codec.
///
/// Validates the naming convention and normalizes the frame-index width; the
/// payload bytes are forwarded unchanged.
fn canonical_name(member: &str, pad_width: usize) -> Result<String> {
    Ok(LogicalPath::parse(member)?.render(pad_width))
}

fn convert_zip(
    source: &Path,
    opts: JobOptions,
    sink: &mut dyn BlobSink,
    progress: &BatchProgress,
) -> Result<()> {
    let file = File::open(source).map_err(|e| Error::io(e, source))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::decode(source, e.to_string()))?;

    for i in 0..archive.len() {
        let mut member = archive
            .by_index(i)
            .map_err(|e| Error::decode(source, e.to_string()))?;
        if member.is_dir() {
            continue;
        }
        let name = member.name().to_string();
        let mut bytes = Vec::with_capacity(member.size() as usize);
        member
            .read_to_end(&mut bytes)
            .map_err(|e| Error::decode(source, format!("corrupt member '{name}': {e}")))?;
        drop(member);

        if is_video_member(&name) {
            let (sequence, group, view) = video_identity(&name)?;
            let staged = stage_video_bytes(&bytes, &name)?;
            video::decode_into_sink(
                staged.path(),
                &sequence,
                group,
                &view,
                opts.pad_width,
                sink,
                progress,
            )?;
        } else {
            let canonical = canonical_name(&name, opts.pad_width)?;
            sink.put(&canonical, &bytes)?;
            progress.record_blob(bytes.len() as u64);
        }
    }
    Ok(())
}

fn convert_tar(
    source: &Path,
    opts: JobOptions,
    sink: &mut dyn BlobSink,
    progress: &BatchProgress,
) -> Result<()> {
    let file = File::open(source).map_err(|e| Error::io(e, source))?;
    let mut archive = tar::Archive::new(BufReader::new(file));
    let entries = archive
        .entries()
        .map_err(|e| Error::decode(source, e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::decode(source, e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .map_err(|e| Error::decode(source, e.to_string()))?
            .to_string_lossy()
            .replace('\\', "/");
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| Error::decode(source, format!("corrupt member '{name}': {e}")))?;

        if is_video_member(&name) {
            let (sequence, group, view) = video_identity(&name)?;
            let staged = stage_video_bytes(&bytes, &name)?;
            video::decode_into_sink(
                staged.path(),
                &sequence,
                group,
                &view,
                opts.pad_width,
                sink,
                progress,
            )?;
        } else {
            let canonical = canonical_name(&name, opts.pad_width)?;
            sink.put(&canonical, &bytes)?;
            progress.record_blob(bytes.len() as u64);
        }
    }
    Ok(())
}

fn convert_video(
    source: &Path,
    rel: &str,
    opts: JobOptions,
    sink: &mut dyn BlobSink,
    progress: &BatchProgress,
) -> Result<()> {
    // A bare video takes its sequence from the parent directory; fall back to
    // the absolute path when the enumeration base was the file itself.
    let member = if rel.contains('/') {
        rel.to_string()
    } else {
        let parent = source
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("");
        format!("{parent}/{rel}")
    };
    let (sequence, group, view) = video_identity(&member)?;
    debug!(video = %source.display(), sequence = %sequence, view = %view, "decoding video source");
    video::decode_into_sink(source, &sequence, group, &view, opts.pad_width, sink, progress)
}

fn is_video_member(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| VIDEO_EXTS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// The external decoder wants a file path, so archive-embedded videos are
/// spilled to a scratch file first.
fn stage_video_bytes(bytes: &[u8], member: &str) -> Result<tempfile::NamedTempFile> {
    let suffix = member
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{ext}"))
        .unwrap_or_default();
    let mut staged = tempfile::Builder::new()
        .prefix("framepack-video-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| Error::io(e, std::env::temp_dir()))?;
    staged
        .write_all(bytes)
        .map_err(|e| Error::io(e, staged.path()))?;
    staged
        .flush()
        .map_err(|e| Error::io(e, staged.path()))?;
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_source_kinds() {
        assert_eq!(SourceKind::detect(Path::new("a/img.zip")), Some(SourceKind::Zip));
        assert_eq!(SourceKind::detect(Path::new("a/img.tar")), Some(SourceKind::Tar));
        assert_eq!(SourceKind::detect(Path::new("a/img_front.MP4")), Some(SourceKind::Video));
        assert_eq!(SourceKind::detect(Path::new("a/notes.txt")), None);
        assert_eq!(SourceKind::detect(Path::new("a/noext")), None);
    }

    #[test]
    fn video_identity_uses_parent_dir_and_stem() {
        let (seq, group, view) = video_identity("clip01/img_front.mp4").unwrap();
        assert_eq!(seq, "clip01");
        assert_eq!(group, DataGroup::Img);
        assert_eq!(view, "front");

        let (seq, _, view) = video_identity("train/clip01/semseg_left_45.mp4").unwrap();
        assert_eq!(seq, "clip01");
        assert_eq!(view, "left_45");

        assert!(video_identity("no-dir.mp4").is_err());
        assert!(video_identity("clip01/unknown_front.mp4").is_err());
    }

    #[test]
    fn member_names_are_normalized_through_the_codec() {
        assert_eq!(
            canonical_name("seq/7_img_front.jpg", 8).unwrap(),
            "seq/00000007_img_front.jpg"
        );
        assert!(canonical_name("seq/readme.txt", 8).is_err());
    }
}
