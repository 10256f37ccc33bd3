//! Human and machine-readable output of a run.

use crate::aggregator::JobStatus;
use crate::constants::PROGRESS_BAR_TEMPLATE;
use crate::job::JobReport;
use crate::settings::Settings;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use tracing::info;

const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
const THRESHOLD: f64 = 1024.0;

/// Format a byte count with binary units, e.g. "512 B", "1.5 KB".
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Percentage of the original size that was saved.
pub fn saved_ratio(total_size: u64, saved: u64) -> f64 {
    if total_size == 0 {
        return 0.0;
    }
    saved as f64 / total_size as f64 * 100.0
}

pub fn log_header(settings: &Settings) {
    let sources: Vec<String> = settings
        .source_paths
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    info!("Sources: {}", sources.join(", "));
    info!(
        "Exceptions: {}, soft mode: {}, temp mode: {}",
        on_off(settings.exceptions_enabled),
        on_off(settings.soft_mode),
        on_off(settings.temp_mode)
    );
    if settings.temp_mode {
        info!("Temp dir: {}", settings.temp_dir.display());
    }
}

pub fn summary_lines(status: &JobStatus) -> Vec<String> {
    let totals = status.totals();
    let mut lines = vec![
        format!(
            "Files: {} ({} processed, {} skipped)",
            totals.total_files, totals.processed_files, totals.skipped_files
        ),
        format!("Source size: {}", format_file_size(totals.total_size)),
        format!(
            "Compressed size: {} ({} saved, {:.1}%)",
            format_file_size(totals.compressed_size()),
            format_file_size(totals.total_saved),
            saved_ratio(totals.total_size, totals.total_saved)
        ),
    ];
    if let Some(elapsed) = status.elapsed() {
        lines.push(format!("Time: {:.1}s", elapsed.as_secs_f64()));
    }
    if totals.failed_tasks > 0 {
        lines.push(format!("Directories with errors: {}", totals.failed_tasks));
    }
    lines
}

pub fn log_summary(report: &JobReport) {
    if report.is_interrupted() {
        info!("Stopped before all directories were processed.");
    }
    for line in summary_lines(&report.status) {
        info!("{}", line);
    }
    info!("Process finished.");
}

/// Write the whole report as one JSON document.
pub fn write_json<W: Write>(report: &JobReport, mut out: W) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(&mut out, report)?;
    writeln!(out).map_err(serde_json::Error::io)
}

/// Per-directory bar on stderr. Its length is set once the queue is built.
pub fn progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template(PROGRESS_BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    ProgressBar::new(0).with_style(style)
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
