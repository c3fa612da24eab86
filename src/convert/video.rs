//! Frame extraction from compressed video containers.
//!
//! Decoding is delegated to the external `ffmpeg` toolchain: `ffprobe`
//! reports stream metadata (frame rate, declared frame count), `ffmpeg`
//! demultiplexes the container into per-frame JPEG images in a scratch
//! directory. Frame indices are assigned in strict decode order starting at
//! 0. A mismatch between the declared and decoded frame count is logged and
//! the job still succeeds; multi-hour batches must not die on a codec's
//! rounding of a duration.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::convert::sink::BlobSink;
use crate::error::{Error, Result};
use crate::keys::{DataGroup, LogicalPath};
use crate::progress::BatchProgress;

/// Extension given to decoded frames.
const FRAME_EXT: &str = "jpg";

/// Stream metadata as reported by `ffprobe`.
#[derive(Debug, Clone, Copy)]
pub struct VideoMeta {
    /// Average frame rate, frames per second.
    pub fps: Option<f64>,
    /// Declared frame count, where the container carries one.
    pub declared_frames: Option<u64>,
    /// Stream duration in seconds.
    pub duration: Option<f64>,
}

impl VideoMeta {
    /// Frames the container claims to hold: the declared count when present,
    /// otherwise duration times frame rate.
    pub fn expected_frames(&self) -> Option<u64> {
        if let Some(n) = self.declared_frames {
            return Some(n);
        }
        match (self.duration, self.fps) {
            (Some(d), Some(f)) if f > 0.0 => Some((d * f).round() as u64),
            _ => None,
        }
    }
}

fn parse_rate(rate: &str) -> Option<f64> {
    // ffprobe reports rates as a fraction, e.g. "10/1".
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => rate.parse().ok(),
    }
}

/// Probe a video file for frame-rate and frame-count metadata.
pub fn probe(path: &Path) -> Result<VideoMeta> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "v:0", "-show_entries"])
        .arg("stream=nb_frames,avg_frame_rate,duration")
        .args(["-of", "json"])
        .arg(path)
        .output()
        .map_err(|e| Error::decode(path, format!("failed to launch ffprobe: {e}")))?;
    if !output.status.success() {
        return Err(Error::decode(
            path,
            format!("ffprobe failed: {}", String::from_utf8_lossy(&output.stderr).trim()),
        ));
    }

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let stream = doc
        .get("streams")
        .and_then(|s| s.get(0))
        .ok_or_else(|| Error::decode(path, "no video stream found"))?;
    let str_field = |key: &str| stream.get(key).and_then(|v| v.as_str());

    Ok(VideoMeta {
        fps: str_field("avg_frame_rate").and_then(parse_rate),
        declared_frames: str_field("nb_frames").and_then(|v| v.parse().ok()),
        duration: str_field("duration").and_then(|v| v.parse().ok()),
    })
}

/// Demultiplex `video` into per-frame JPEGs under `scratch`, returning the
/// frame files in decode order.
fn extract_to_scratch(video: &Path, scratch: &Path) -> Result<Vec<PathBuf>> {
    let output = Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-i"])
        .arg(video)
        // Emit every decoded frame; no duplication or drop to hit a target rate.
        .args(["-vsync", "0", "-qscale:v", "2", "-start_number", "0"])
        .arg(scratch.join("%08d.jpg"))
        .output()
        .map_err(|e| Error::decode(video, format!("failed to launch ffmpeg: {e}")))?;
    if !output.status.success() {
        return Err(Error::decode(
            video,
            format!("ffmpeg failed: {}", String::from_utf8_lossy(&output.stderr).trim()),
        ));
    }

    let mut frames = Vec::new();
    for entry in std::fs::read_dir(scratch).map_err(|e| Error::io(e, scratch))? {
        let entry = entry.map_err(|e| Error::io(e, scratch))?;
        if entry.path().extension().and_then(|e| e.to_str()) == Some("jpg") {
            frames.push(entry.path());
        }
    }
    // Decode order equals the zero-padded output numbering.
    frames.sort();
    if frames.is_empty() {
        return Err(Error::decode(video, "decoder produced no frames"));
    }
    Ok(frames)
}

/// Decode one video into frame blobs named
/// `<sequence>/<frame>_<group>_<view>.jpg`, in strict decode order from 0.
pub fn decode_into_sink(
    video: &Path,
    sequence: &str,
    group: DataGroup,
    view: &str,
    pad_width: usize,
    sink: &mut dyn BlobSink,
    progress: &BatchProgress,
) -> Result<()> {
    let meta = probe(video)?;
    let scratch = tempfile::Builder::new()
        .prefix("framepack-frames-")
        .tempdir()
        .map_err(|e| Error::io(e, std::env::temp_dir()))?;
    let frames = extract_to_scratch(video, scratch.path())?;

    if let Some(expected) = meta.expected_frames() {
        if expected != frames.len() as u64 {
            warn!(
                video = %video.display(),
                expected,
                decoded = frames.len(),
                "decoded frame count differs from container metadata"
            );
        }
    } else {
        debug!(video = %video.display(), "container carries no usable frame-count metadata");
    }

    for (index, frame) in frames.iter().enumerate() {
        let bytes = std::fs::read(frame).map_err(|e| Error::io(e, frame))?;
        let name =
            LogicalPath::new(sequence, index as u64, group, view, FRAME_EXT)?.render(pad_width);
        sink.put(&name, &bytes)?;
        progress.record_blob(bytes.len() as u64);
    }
    Ok(())
}
