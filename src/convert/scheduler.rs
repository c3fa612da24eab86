//! Batch scheduling of conversion jobs.
//!
//! The scheduler enumerates sources, fans jobs out across a fixed-size pool
//! of worker threads over bounded channels, and aggregates per-job outcomes
//! into a [`BatchReport`]. Failures never cancel sibling jobs: every
//! remaining job runs, and the report carries the reasons.
//!
//! For pack output the scheduler also runs the single merge writer: workers
//! hand back sealed parts and the coordinator appends them strictly in job
//! order (buffering out-of-order completions), so the final pack is
//! byte-identical whatever the worker count.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crossbeam_channel::bounded;
use regex::Regex;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::convert::job::{self, JobOptions, JobSpec, SourceKind};
use crate::convert::sink::{BlobSink, FolderSink, PartSink, SinkOutput, TarSink, ZipSink};
use crate::convert::OutputMode;
use crate::error::{Error, Result};
use crate::pack::{PackPart, PackWriter};
use crate::progress::BatchProgress;

/// Everything one batch needs, resolved from configuration and CLI flags
/// before any job runs.
#[derive(Debug)]
pub struct BatchPlan {
    /// Source files, or directories to walk for sources.
    pub inputs: Vec<PathBuf>,
    /// Output root: a directory for folder/zip/tar modes, the pack file for
    /// pack mode.
    pub output: PathBuf,
    pub mode: OutputMode,
    /// Worker thread count; `<= 1` runs strictly sequentially.
    pub workers: usize,
    pub pad_width: usize,
    /// Optional filter applied to enumeration-relative source paths.
    pub filter: Option<Regex>,
    /// Re-convert sources whose output unit already exists.
    pub overwrite: bool,
}

/// One failed job in the final report.
#[derive(Debug)]
pub struct JobFailure {
    pub source: PathBuf,
    pub reason: String,
}

/// Aggregate outcome of a batch.
#[derive(Debug)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failures: Vec<JobFailure>,
    pub blobs: u64,
    pub bytes: u64,
    pub elapsed: std::time::Duration,
}

impl BatchReport {
    pub fn all_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Outcome {
    Done { id: usize, source: PathBuf, part: Option<PackPart> },
    Skipped { id: usize, source: PathBuf },
    Failed { id: usize, source: PathBuf, reason: String },
}

/// Run a conversion batch to completion.
pub fn run_batch(plan: &BatchPlan) -> Result<BatchReport> {
    let sources = enumerate_sources(&plan.inputs, plan.filter.as_ref())?;
    if sources.is_empty() {
        return Err(Error::NoSources);
    }

    // Pack mode owns a single output artifact; refuse to clobber it unless
    // asked. The staged write means an interrupted run leaves nothing behind.
    let mut pack_writer = None;
    let mut stage_dir = PathBuf::new();
    if plan.mode == OutputMode::Pack {
        if plan.output.exists() && !plan.overwrite {
            return Err(Error::Config(format!(
                "output pack '{}' already exists (use --overwrite to replace it)",
                plan.output.display()
            )));
        }
        pack_writer = Some(PackWriter::create(&plan.output)?);
        stage_dir = plan
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
    }

    let jobs: Vec<JobSpec> = sources
        .into_iter()
        .enumerate()
        .map(|(id, (source, rel, kind))| JobSpec { id, source, rel, kind })
        .collect();
    let total = jobs.len();
    let workers = plan.workers.max(1).min(total);
    info!(total, workers, mode = %plan.mode, output = %plan.output.display(), "starting conversion batch");

    let progress = BatchProgress::new(total);
    let opts = JobOptions { pad_width: plan.pad_width };

    let (job_tx, job_rx) = bounded::<JobSpec>(workers);
    let (out_tx, out_rx) = bounded::<Outcome>(workers);

    let mut succeeded = 0usize;
    let mut skipped = 0usize;
    let mut failures: Vec<JobFailure> = Vec::new();

    std::thread::scope(|s| -> Result<()> {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let out_tx = out_tx.clone();
            let progress = &progress;
            let stage_dir = stage_dir.clone();
            s.spawn(move || {
                for spec in job_rx {
                    let outcome = run_one(&spec, plan, opts, &stage_dir, progress);
                    if out_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(out_tx);
        drop(job_rx);

        s.spawn(move || {
            for spec in jobs {
                if job_tx.send(spec).is_err() {
                    break;
                }
            }
        });

        // Coordinator: aggregate outcomes and, for pack output, merge parts
        // in job order. Consuming the receiver here means an early error drops
        // it, which unblocks any worker mid-send.
        let mut next_merge = 0usize;
        let mut pending: BTreeMap<usize, Option<PackPart>> = BTreeMap::new();
        for outcome in out_rx {
            let (id, slot) = match outcome {
                Outcome::Done { id, source, part } => {
                    progress.record_job_done();
                    succeeded += 1;
                    let snap = progress.snapshot();
                    info!(
                        source = %source.display(),
                        settled = snap.settled_jobs(),
                        total,
                        blobs = snap.blobs,
                        "job finished"
                    );
                    (id, part)
                }
                Outcome::Skipped { id, source } => {
                    progress.record_job_skipped();
                    skipped += 1;
                    info!(source = %source.display(), "output unit exists, skipping");
                    (id, None)
                }
                Outcome::Failed { id, source, reason } => {
                    progress.record_job_failed();
                    error!(source = %source.display(), reason = %reason, "job failed");
                    failures.push(JobFailure { source, reason });
                    (id, None)
                }
            };
            if let Some(writer) = pack_writer.as_mut() {
                pending.insert(id, slot);
                while let Some(slot) = pending.remove(&next_merge) {
                    if let Some(part) = slot {
                        writer.append_part(part)?;
                    }
                    next_merge += 1;
                }
            }
        }
        Ok(())
    })?;

    if let Some(writer) = pack_writer {
        writer.finalize()?;
    }

    let snap = progress.snapshot();
    let report = BatchReport {
        total,
        succeeded,
        skipped,
        failures,
        blobs: snap.blobs,
        bytes: snap.bytes,
        elapsed: snap.elapsed,
    };
    info!(
        succeeded = report.succeeded,
        skipped = report.skipped,
        failed = report.failures.len(),
        blobs = report.blobs,
        mib = report.bytes / (1024 * 1024),
        elapsed_s = report.elapsed.as_secs(),
        "conversion batch complete"
    );
    Ok(report)
}

/// Expand the input paths into a sorted, deduplicated source list.
///
/// Files are taken literally; directories are walked recursively. Each source
/// keeps its path relative to the enumeration base; that relative path names
/// the per-source output unit and is what the filter matches against.
fn enumerate_sources(
    inputs: &[PathBuf],
    filter: Option<&Regex>,
) -> Result<Vec<(PathBuf, String, SourceKind)>> {
    let mut found = Vec::new();
    for input in inputs {
        let meta = fs::metadata(input).map_err(|e| Error::io(e, input))?;
        if meta.is_file() {
            match SourceKind::detect(input) {
                Some(kind) => {
                    let rel = input
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    found.push((input.clone(), rel, kind));
                }
                None => warn!(input = %input.display(), "input is not a convertible source, ignoring"),
            }
        } else {
            for entry in WalkDir::new(input).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    let path = e.path().unwrap_or(input).to_path_buf();
                    Error::io(
                        e.into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("walk error")),
                        path,
                    )
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(kind) = SourceKind::detect(entry.path()) else {
                    continue;
                };
                let rel = entry
                    .path()
                    .strip_prefix(input)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                found.push((entry.path().to_path_buf(), rel, kind));
            }
        }
    }
    if let Some(re) = filter {
        found.retain(|(_, rel, _)| re.is_match(rel));
    }
    // Deterministic job ids: content identity lives in the logical paths, but
    // a stable order keeps pack layout and resume behavior reproducible.
    found.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    found.dedup_by(|a, b| a.0 == b.0);
    Ok(found)
}

/// Final location of a per-source output unit (zip/tar modes).
fn unit_dest(output: &Path, rel: &str, mode: OutputMode) -> PathBuf {
    let ext = match mode {
        OutputMode::Zip => "zip",
        OutputMode::Tar => "tar",
        _ => unreachable!("unit_dest is only used for per-source archive modes"),
    };
    output.join(rel).with_extension(ext)
}

fn run_one(
    spec: &JobSpec,
    plan: &BatchPlan,
    opts: JobOptions,
    stage_dir: &Path,
    progress: &BatchProgress,
) -> Outcome {
    let failed = |reason: String| Outcome::Failed {
        id: spec.id,
        source: spec.source.clone(),
        reason,
    };

    let sink_result: Result<Box<dyn BlobSink>> = match plan.mode {
        OutputMode::Folder => FolderSink::create(&plan.output).map(|s| Box::new(s) as _),
        OutputMode::Zip | OutputMode::Tar => {
            let dest = unit_dest(&plan.output, &spec.rel, plan.mode);
            if dest.exists() && !plan.overwrite {
                return Outcome::Skipped { id: spec.id, source: spec.source.clone() };
            }
            match plan.mode {
                OutputMode::Zip => ZipSink::create(&dest).map(|s| Box::new(s) as _),
                _ => TarSink::create(&dest).map(|s| Box::new(s) as _),
            }
        }
        OutputMode::Pack => PartSink::create(stage_dir).map(|s| Box::new(s) as _),
    };
    let mut sink = match sink_result {
        Ok(sink) => sink,
        Err(e) => return failed(e.to_string()),
    };

    match job::run_job(spec, opts, sink.as_mut(), progress) {
        Ok(()) => match sink.finish() {
            Ok(SinkOutput::Persisted) => {
                Outcome::Done { id: spec.id, source: spec.source.clone(), part: None }
            }
            Ok(SinkOutput::Part(part)) => {
                Outcome::Done { id: spec.id, source: spec.source.clone(), part: Some(part) }
            }
            Err(e) => failed(e.to_string()),
        },
        // Dropping the sink discards the job's staged output.
        Err(e) => failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_dest_mirrors_relative_layout() {
        assert_eq!(
            unit_dest(Path::new("out"), "front/img.zip", OutputMode::Tar),
            Path::new("out/front/img.tar")
        );
        assert_eq!(
            unit_dest(Path::new("out"), "seq001.zip", OutputMode::Zip),
            Path::new("out/seq001.zip")
        );
    }
}
