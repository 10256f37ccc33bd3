//! Tracing subscriber setup.
//!
//! The verbosity level decides both the level filter and where events go.
//! `RUST_LOG`, when set, overrides the level filter.

use crate::settings::Verbosity;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::mem;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn default_level(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::LogFile | Verbosity::Directories => "info",
        Verbosity::Files => "debug",
        Verbosity::Json => "warn",
    }
}

/// Terminal writer that hides `progress` while a log line is printed, so
/// the bar is redrawn below the line instead of being torn by it.
#[derive(Debug, Clone)]
pub struct ProgressAwareWriter<M> {
    progress: ProgressBar,
    make_inner: M,
}

impl<M> ProgressAwareWriter<M> {
    pub fn new(progress: ProgressBar, make_inner: M) -> Self {
        Self {
            progress,
            make_inner,
        }
    }
}

impl<'a, M> MakeWriter<'a> for ProgressAwareWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SuspendingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendingWriter {
            progress: self.progress.clone(),
            inner: self.make_inner.make_writer(),
            buffer: Vec::new(),
        }
    }
}

/// Buffers one event and writes it out in a single suspended burst.
pub struct SuspendingWriter<W: Write> {
    progress: ProgressBar,
    inner: W,
    buffer: Vec<u8>,
}

impl<W: Write> SuspendingWriter<W> {
    fn write_buffered(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let buffer = mem::take(&mut self.buffer);
        let inner = &mut self.inner;
        self.progress.suspend(|| {
            inner.write_all(&buffer)?;
            inner.flush()
        })
    }
}

impl<W: Write> Write for SuspendingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_buffered()
    }
}

impl<W: Write> Drop for SuspendingWriter<W> {
    fn drop(&mut self) {
        // Nowhere left to report a failed log write
        let _ = self.write_buffered();
    }
}

/// Install the global subscriber. The returned guard flushes the log file
/// when dropped and must live until the end of `main`.
///
/// Console output at levels 1 and 2 is interleaved with `progress`.
pub fn init(
    verbosity: Verbosity,
    log_file: &Path,
    progress: &ProgressBar,
) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));

    match verbosity {
        Verbosity::LogFile => {
            let directory = match log_file.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            fs::create_dir_all(directory).with_context(|| {
                format!("Failed to create log directory: {}", directory.display())
            })?;
            let file_name = log_file
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", log_file.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_thread_names(true),
                )
                .try_init()
                .context("Failed to install log subscriber")?;
            Ok(Some(guard))
        }
        Verbosity::Directories | Verbosity::Files => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(io::stdout().is_terminal())
                        .with_writer(ProgressAwareWriter::new(progress.clone(), io::stdout)),
                )
                .try_init()
                .context("Failed to install log subscriber")?;
            Ok(None)
        }
        // stdout carries the JSON report
        Verbosity::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .context("Failed to install log subscriber")?;
            Ok(None)
        }
    }
}
