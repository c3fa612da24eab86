//! Main entry point for the framepack CLI app.

use std::io::Write;
use std::process::ExitCode;

use framepack::backend::open_backend;
use framepack::cli::{self, Commands};
use framepack::config::Settings;
use framepack::convert::{run_batch, BatchPlan};
use framepack::error::Error;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run_app() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_app() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = cli::parse();
    let settings = Settings::load(args.config.as_deref())?;

    match args.command {
        Commands::Convert { inputs, output, mode, workers, pad_width, filter, overwrite } => {
            let settings = Settings {
                pad_width: pad_width.unwrap_or(settings.pad_width),
                workers: workers.unwrap_or(settings.workers),
                mode: mode.unwrap_or(settings.mode),
            };
            settings.validate()?;
            let filter = filter
                .map(|f| regex::Regex::new(&f))
                .transpose()
                .map_err(|e| Error::Config(format!("invalid --filter regex: {e}")))?;

            let plan = BatchPlan {
                inputs,
                output,
                mode: settings.mode,
                workers: settings.effective_workers(),
                pad_width: settings.pad_width,
                filter,
                overwrite,
            };
            let report = run_batch(&plan)?;

            eprintln!(
                "batch finished: {} ok, {} skipped, {} failed of {} source(s) | {} blobs, {:.1} MiB in {:.1}s",
                report.succeeded,
                report.skipped,
                report.failures.len(),
                report.total,
                report.blobs,
                report.bytes as f64 / (1024.0 * 1024.0),
                report.elapsed.as_secs_f64(),
            );
            for failure in &report.failures {
                eprintln!("  failed: {}: {}", failure.source.display(), failure.reason);
            }
            if report.all_ok() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::List { root } => {
            let backend = open_backend(&root)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for path in backend.list()? {
                writeln!(out, "{}", path.render(settings.pad_width))?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cat { root, name } => {
            let backend = open_backend(&root)?;
            let bytes = backend.read(&name)?;
            std::io::stdout().write_all(&bytes)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
