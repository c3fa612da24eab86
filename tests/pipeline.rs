//! Scheduler-level properties: partial-failure tolerance, resume semantics,
//! idempotence, and worker-count invariance of the final artifacts.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use framepack::backend::open_backend;
use framepack::convert::{run_batch, BatchPlan, OutputMode};
use framepack::error::Error;

fn write_zip(dest: &Path, seq: &str, frames: u64) {
    let file = fs::File::create(dest).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for frame in 0..frames {
        writer
            .start_file(format!("{seq}/{frame:08}_img_front.jpg"), options)
            .unwrap();
        writer
            .write_all(format!("jpeg:{seq}:{frame}").as_bytes())
            .unwrap();
    }
    writer.finish().unwrap();
}

fn fixture_release(dir: &Path) -> PathBuf {
    let raw = dir.join("raw");
    fs::create_dir_all(&raw).unwrap();
    write_zip(&raw.join("seq001.zip"), "seq001", 2);
    write_zip(&raw.join("seq002.zip"), "seq002", 3);
    write_zip(&raw.join("seq003.zip"), "seq003", 1);
    raw
}

fn plan(raw: &Path, output: &Path, mode: OutputMode, workers: usize) -> BatchPlan {
    BatchPlan {
        inputs: vec![raw.to_path_buf()],
        output: output.to_path_buf(),
        mode,
        workers,
        pad_width: 8,
        filter: None,
        overwrite: false,
    }
}

#[test]
fn corrupted_source_fails_alone() {
    let dir = tempfile::tempdir().unwrap();
    let raw = fixture_release(dir.path());
    fs::write(raw.join("seq000.zip"), b"garbage, not a central directory").unwrap();

    let out = dir.path().join("mirror");
    let report = run_batch(&plan(&raw, &out, OutputMode::Zip, 4)).unwrap();

    assert_eq!(report.total, 4);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].source.ends_with("seq000.zip"));
    assert!(!report.all_ok());

    // Every healthy output is independently readable.
    for seq in ["seq001", "seq002", "seq003"] {
        let backend = open_backend(&out.join(format!("{seq}.zip"))).unwrap();
        assert!(backend.exists(&format!("{seq}/00000000_img_front.jpg")));
    }
    assert!(!out.join("seq000.zip").exists());
}

#[test]
fn worker_count_does_not_change_the_pack_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let raw = fixture_release(dir.path());

    let serial = dir.path().join("serial.fpk");
    let parallel = dir.path().join("parallel.fpk");
    run_batch(&plan(&raw, &serial, OutputMode::Pack, 1)).unwrap();
    run_batch(&plan(&raw, &parallel, OutputMode::Pack, 8)).unwrap();

    assert_eq!(fs::read(&serial).unwrap(), fs::read(&parallel).unwrap());
}

#[test]
fn rerun_skips_existing_units_and_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let raw = fixture_release(dir.path());
    let out = dir.path().join("mirror");

    let first = run_batch(&plan(&raw, &out, OutputMode::Zip, 2)).unwrap();
    assert_eq!(first.succeeded, 3);
    assert_eq!(first.skipped, 0);
    let before = fs::read(out.join("seq002.zip")).unwrap();

    let second = run_batch(&plan(&raw, &out, OutputMode::Zip, 2)).unwrap();
    assert_eq!(second.succeeded, 0);
    assert_eq!(second.skipped, 3);
    assert!(second.all_ok());
    assert_eq!(fs::read(out.join("seq002.zip")).unwrap(), before);
}

#[test]
fn overwrite_reproduces_identical_archives() {
    let dir = tempfile::tempdir().unwrap();
    let raw = fixture_release(dir.path());
    let out = dir.path().join("mirror");

    run_batch(&plan(&raw, &out, OutputMode::Tar, 2)).unwrap();
    let before = fs::read(out.join("seq001.tar")).unwrap();

    let mut redo = plan(&raw, &out, OutputMode::Tar, 2);
    redo.overwrite = true;
    let report = run_batch(&redo).unwrap();
    assert_eq!(report.succeeded, 3);
    assert_eq!(fs::read(out.join("seq001.tar")).unwrap(), before);
}

#[test]
fn folder_mode_mirrors_logical_paths() {
    let dir = tempfile::tempdir().unwrap();
    let raw = fixture_release(dir.path());
    let out = dir.path().join("tree");

    let report = run_batch(&plan(&raw, &out, OutputMode::Folder, 2)).unwrap();
    assert!(report.all_ok());
    assert_eq!(
        fs::read(out.join("seq002/00000001_img_front.jpg")).unwrap(),
        b"jpeg:seq002:1"
    );

    let backend = open_backend(&out).unwrap();
    assert_eq!(backend.list().unwrap().len(), 6);
}

#[test]
fn tar_sources_forward_members() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir_all(&raw).unwrap();

    // One tar source carrying canonical members.
    let file = fs::File::create(raw.join("seq010.tar")).unwrap();
    let mut builder = tar::Builder::new(file);
    for frame in 0..2u64 {
        let data = format!("png:{frame}").into_bytes();
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append_data(
                &mut header,
                format!("seq010/{frame:08}_semseg_front.png"),
                data.as_slice(),
            )
            .unwrap();
    }
    builder.into_inner().unwrap();

    let pack = dir.path().join("out.fpk");
    let report = run_batch(&plan(&raw, &pack, OutputMode::Pack, 1)).unwrap();
    assert!(report.all_ok());
    assert_eq!(report.blobs, 2);

    let backend = open_backend(&pack).unwrap();
    assert_eq!(
        backend.read("seq010/00000001_semseg_front.png").unwrap(),
        b"png:1"
    );
}

#[test]
fn member_width_is_normalized_through_the_codec() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir_all(&raw).unwrap();

    // Legacy four-digit frame numbering in the source archive.
    let file = fs::File::create(raw.join("seq020.zip")).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    writer.start_file("seq020/0005_img_front.jpg", options).unwrap();
    writer.write_all(b"payload").unwrap();
    writer.finish().unwrap();

    let pack = dir.path().join("out.fpk");
    run_batch(&plan(&raw, &pack, OutputMode::Pack, 1)).unwrap();

    let backend = open_backend(&pack).unwrap();
    assert!(backend.exists("seq020/00000005_img_front.jpg"));
    assert!(!backend.exists("seq020/0005_img_front.jpg"));
}

#[test]
fn empty_enumeration_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let empty = dir.path().join("empty");
    fs::create_dir_all(&empty).unwrap();

    let result = run_batch(&plan(&empty, &dir.path().join("out.fpk"), OutputMode::Pack, 1));
    assert!(matches!(result, Err(Error::NoSources)));
}

#[test]
fn malformed_member_names_fail_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir_all(&raw).unwrap();

    let file = fs::File::create(raw.join("seq030.zip")).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    writer.start_file("seq030/notes.txt", options).unwrap();
    writer.write_all(b"stray file").unwrap();
    writer.finish().unwrap();
    write_zip(&raw.join("seq031.zip"), "seq031", 1);

    let out = dir.path().join("mirror");
    let report = run_batch(&plan(&raw, &out, OutputMode::Zip, 2)).unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].reason.contains("malformed logical path"));
}
