use anyhow::{Context, Result};
use clap::Parser;
use dir_squeeze::cli::Args;
use dir_squeeze::constants::FORCED_EXIT_CODE;
use dir_squeeze::{logging, report, JobController, Settings, StandardCodec, Verbosity};
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

const INTERRUPT_NOTICE: &str =
    "Interrupt received, finishing directories in progress. Press Ctrl-C again to exit now.";

fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let settings = Settings::from_args(args)
        .with_context(|| format!("Invalid configuration ({})", args.config.display()))?;
    let verbosity = settings.verbosity;
    let progress =
        report::progress_bar(verbosity == Verbosity::Directories && io::stderr().is_terminal());
    let _guard = logging::init(verbosity, &settings.log_file, &progress)?;

    if !verbosity.is_structured() {
        report::log_header(&settings);
    }

    let controller =
        JobController::new(settings, Arc::new(StandardCodec::new())).with_progress(progress);

    let notice_on_stderr = !verbosity.logs_to_terminal();
    let cancel = controller.cancellation_token();
    ctrlc::set_handler(move || {
        // Exits without removing the temp-mode scratch directory
        if cancel.cancel() {
            std::process::exit(FORCED_EXIT_CODE);
        }
        warn!("{}", INTERRUPT_NOTICE);
        if notice_on_stderr {
            eprintln!("{}", INTERRUPT_NOTICE);
        }
    })
    .context("Failed to install Ctrl-C handler")?;

    let job_report = controller.run().context("Compression job failed")?;

    if verbosity.is_structured() {
        report::write_json(&job_report, io::stdout().lock())
            .context("Failed to write JSON report")?;
    } else {
        report::log_summary(&job_report);
    }

    Ok(())
}
