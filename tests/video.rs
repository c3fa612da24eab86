//! Frame-extraction tests. These need the external `ffmpeg`/`ffprobe`
//! binaries and silently pass when they are not installed, so the rest of
//! the suite stays hermetic.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use framepack::backend::open_backend;
use framepack::convert::{run_batch, BatchPlan, OutputMode};

fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
        && Command::new("ffprobe")
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
}

/// Synthesize a 10-frame, 10 fps test clip.
fn make_clip(dest: &Path) {
    fs::create_dir_all(dest.parent().unwrap()).unwrap();
    let status = Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-f", "lavfi", "-i"])
        .arg("testsrc=duration=1:size=64x64:rate=10")
        // The built-in mpeg4 encoder, so the test does not depend on how the
        // installed ffmpeg was configured.
        .args(["-c:v", "mpeg4"])
        .arg(dest)
        .status()
        .unwrap();
    assert!(status.success(), "ffmpeg could not synthesize the test clip");
}

fn plan(inputs: Vec<PathBuf>, output: &Path, mode: OutputMode) -> BatchPlan {
    BatchPlan {
        inputs,
        output: output.to_path_buf(),
        mode,
        workers: 1,
        pad_width: 8,
        filter: None,
        overwrite: false,
    }
}

#[test]
fn bare_video_decodes_to_indexed_frames() {
    if !ffmpeg_available() {
        eprintln!("ffmpeg/ffprobe not on PATH; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    make_clip(&raw.join("clip01/img_front.mp4"));

    let out = dir.path().join("tree");
    let report = run_batch(&plan(vec![raw], &out, OutputMode::Folder)).unwrap();
    assert!(report.all_ok());
    assert_eq!(report.blobs, 10);

    for frame in 0..10u64 {
        let path = out.join(format!("clip01/{frame:08}_img_front.jpg"));
        assert!(path.is_file(), "missing decoded frame {frame}");
    }
    assert!(!out.join("clip01/00000010_img_front.jpg").exists());
}

#[test]
fn archived_video_decodes_into_a_pack() {
    if !ffmpeg_available() {
        eprintln!("ffmpeg/ffprobe not on PATH; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("scratch/img_front.mp4");
    make_clip(&clip);

    // Wrap the clip in a tar the way release video bundles ship.
    let raw = dir.path().join("raw");
    fs::create_dir_all(&raw).unwrap();
    let file = fs::File::create(raw.join("videos.tar")).unwrap();
    let mut builder = tar::Builder::new(file);
    builder
        .append_path_with_name(&clip, "clip02/img_front.mp4")
        .unwrap();
    builder.into_inner().unwrap();

    let pack = dir.path().join("out.fpk");
    let report = run_batch(&plan(vec![raw], &pack, OutputMode::Pack)).unwrap();
    assert!(report.all_ok());
    assert_eq!(report.blobs, 10);

    let backend = open_backend(&pack).unwrap();
    assert!(backend.exists("clip02/00000000_img_front.jpg"));
    assert!(backend.exists("clip02/00000009_img_front.jpg"));
    let bytes = backend.read("clip02/00000004_img_front.jpg").unwrap();
    // JPEG SOI marker: the blob is a decoded image, not container bytes.
    assert_eq!(&bytes[..2], &[0xff, 0xd8]);
}
